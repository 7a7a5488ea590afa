//! The band math filter.
//!
//! [`BandMathFilter`] owns the variable registry and the expressions, borrows
//! the inputs, and runs the whole pipeline:
//!
//! 1. validate inputs, expressions and the output region
//! 2. compile every expression and resolve its free identifiers
//! 3. negotiate the padded input regions
//! 4. precompute global statistics
//! 5. build one evaluator set per worker and fix output dimensions
//! 6. stream the output region strip by strip, each strip split into row
//!    ranges evaluated in parallel

use crate::core::error::{BandMathError, BandMathResult, ContextError};
use crate::core::raster::{RasterBlock, RasterSource, VectorImage};
use crate::core::region::{pad_and_crop, Halo, Region};
use crate::engine::context::{at_line, parse_context, write_context, Directive};
use crate::engine::halo::{compute_required_regions, required_halos};
use crate::engine::options::RunOptions;
use crate::engine::pixel_loop::{evaluate_rows, StripContext};
use crate::engine::pool::EvaluatorPool;
use crate::engine::progress::ProgressTracker;
use crate::engine::registry::{parse_matrix_definition, InputInfo, VariableRegistry};
use crate::engine::stats::GlobalStatistics;
use crate::expr::evaluator::Evaluator;
use crate::expr::value::Scalar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

/// Counters of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Output pixels written.
    pub pixels: u64,
    /// Streamed regions evaluated.
    pub regions: usize,
    /// Components clamped to the pixel type's minimum.
    pub underflow: u64,
    /// Components clamped to the pixel type's maximum.
    pub overflow: u64,
    /// Worker threads used.
    pub threads: usize,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Images produced by a run, one per expression, plus the run's counters.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub outputs: Vec<VectorImage>,
    pub report: RunReport,
}

/// Multi-image, multi-expression band math.
pub struct BandMathFilter<'a> {
    registry: VariableRegistry,
    sources: Vec<&'a dyn RasterSource>,
    expressions: Vec<String>,
    many_expressions: bool,
    options: RunOptions,
    active: Vec<String>,
}

impl<'a> BandMathFilter<'a> {
    /// Create a filter in multi-expression mode with default options.
    pub fn new() -> Self {
        Self {
            registry: VariableRegistry::new(),
            sources: Vec::new(),
            expressions: Vec::new(),
            many_expressions: true,
            options: RunOptions::default(),
            active: Vec::new(),
        }
    }

    /// Replace the run options.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Current run options.
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Choose whether [`set_expression`](Self::set_expression) appends a new
    /// output (`true`, the default) or replaces the single one.
    ///
    /// The mode cannot change once an expression is registered.
    pub fn set_many_expressions(&mut self, many: bool) -> BandMathResult<()> {
        if many != self.many_expressions && !self.expressions.is_empty() {
            return Err(BandMathError::ModeChangeAfterExpressions {
                count: self.expressions.len(),
            });
        }
        self.many_expressions = many;
        Ok(())
    }

    /// Whether the filter is in multi-expression mode.
    pub fn many_expressions(&self) -> bool {
        self.many_expressions
    }

    /// Declare an input. Without a name it is called `im<j+1>`.
    ///
    /// Returns the input's 0-based index.
    pub fn declare_input(&mut self, source: &'a dyn RasterSource, name: Option<&str>) -> BandMathResult<usize> {
        let index = self.registry.declare_input(
            name,
            source.band_count(),
            source.geometry(),
            source.largest_region(),
        )?;
        self.sources.push(source);
        Ok(index)
    }

    /// Declare a scalar constant.
    pub fn declare_constant(&mut self, name: &str, value: impl Into<Scalar>) -> BandMathResult<()> {
        self.registry.declare_constant(name, value.into())?;
        Ok(())
    }

    /// Declare a `rows x cols` matrix from row-major values.
    pub fn declare_matrix(&mut self, name: &str, rows: usize, cols: usize, values: Vec<f64>) -> BandMathResult<()> {
        self.registry.declare_matrix(name, rows, cols, values)?;
        Ok(())
    }

    /// Declare a matrix from its textual form `{ a , b ; c , d }`.
    pub fn declare_matrix_definition(&mut self, name: &str, definition: &str) -> BandMathResult<()> {
        let (rows, cols, values) = parse_matrix_definition(definition)?;
        self.declare_matrix(name, rows, cols, values)
    }

    /// Register an expression.
    ///
    /// A `;` outside any parentheses or braces separates components: the text
    /// is rewritten into one `cat(...)` expression with a wider output.
    pub fn set_expression(&mut self, text: &str) {
        add_expression(&mut self.expressions, self.many_expressions, text);
    }

    /// Forget every expression.
    pub fn clear_expressions(&mut self) {
        self.expressions.clear();
    }

    /// Registered expressions, as stored.
    pub fn expressions(&self) -> &[String] {
        &self.expressions
    }

    /// The variable catalogue.
    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    /// Names of the variables the last successful preparation bound.
    pub fn active_variable_names(&self) -> &[String] {
        &self.active
    }

    // ========================================================================
    // Context files
    // ========================================================================

    /// Render constants, matrices and expressions as a context text.
    pub fn context_to_string(&self) -> BandMathResult<String> {
        Ok(write_context(
            self.registry.constants(),
            self.registry.matrices(),
            &self.expressions,
        )?)
    }

    /// Write the context to `path`.
    pub fn export_context(&self, path: impl AsRef<Path>) -> BandMathResult<()> {
        let path = path.as_ref();
        let text = self.context_to_string()?;
        std::fs::write(path, text).map_err(|source| ContextError::Io {
            path: path.display().to_string(),
            source,
        })?;
        log::info!("Context exported to {}", path.display());
        Ok(())
    }

    /// Read a context file and apply its directives in order.
    ///
    /// Either every directive is applied or, on error, none is.
    pub fn import_context(&mut self, path: impl AsRef<Path>) -> BandMathResult<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ContextError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.apply_context(&text, &path.display().to_string())
    }

    /// Apply a context text.
    pub fn import_context_str(&mut self, text: &str) -> BandMathResult<()> {
        self.apply_context(text, "<string>")
    }

    fn apply_context(&mut self, text: &str, origin: &str) -> BandMathResult<()> {
        let entries = parse_context(text, origin)?;
        let mut registry = self.registry.clone();
        let mut expressions = self.expressions.clone();
        for entry in entries {
            match entry.directive {
                Directive::Constant { name, value } => registry
                    .declare_constant(&name, value)
                    .map_err(at_line(entry.line))?,
                Directive::Matrix {
                    name,
                    rows,
                    cols,
                    values,
                } => registry
                    .declare_matrix(&name, rows, cols, values)
                    .map_err(at_line(entry.line))?,
                Directive::Expression(expression) => {
                    add_expression(&mut expressions, self.many_expressions, &expression)
                }
            }
        }
        self.registry = registry;
        self.expressions = expressions;
        Ok(())
    }

    // ========================================================================
    // Running
    // ========================================================================

    /// Evaluate every expression over the whole common extent of the inputs.
    pub fn run_largest(&mut self) -> BandMathResult<RunOutput> {
        let region = self.sources.first().ok_or(BandMathError::NoInputs)?.largest_region();
        self.run(region)
    }

    /// Evaluate every expression over `output`.
    pub fn run(&mut self, output: Region) -> BandMathResult<RunOutput> {
        let mut tracker = ProgressTracker::new();
        if let Some(callback) = self.options.progress_callback.clone() {
            tracker = tracker.with_callback(Box::new(move |update| callback(update)));
        }
        self.run_with_tracker(output, &tracker)
    }

    /// Evaluate every expression over `output`, reporting to `tracker`.
    ///
    /// Cancelling the tracker stops the run at the next region boundary.
    pub fn run_with_tracker(&mut self, output: Region, tracker: &ProgressTracker) -> BandMathResult<RunOutput> {
        let result = self.execute(output, tracker);
        if let Err(ref e) = result {
            if !matches!(e, BandMathError::Cancelled { .. }) {
                tracker.report_error(e.to_string());
            }
        }
        result
    }

    fn execute(&mut self, output: Region, tracker: &ProgressTracker) -> BandMathResult<RunOutput> {
        let start = Instant::now();
        self.validate(&output)?;

        let templates = self
            .expressions
            .iter()
            .map(|text| {
                Evaluator::compile(text).map_err(|source| BandMathError::Evaluation {
                    expression: text.clone(),
                    source,
                })
            })
            .collect::<BandMathResult<Vec<_>>>()?;

        let active = self
            .registry
            .resolve(templates.iter().flat_map(|t| t.free_identifiers().iter().map(String::as_str)))?;
        log::debug!("{} active variable(s)", active.len());

        let inputs = self.registry.inputs();
        let halos = required_halos(&active, inputs.len());
        let required = compute_required_regions(&output, &halos, inputs)?;
        for (input, region) in inputs.iter().zip(&required) {
            log::debug!("Input '{}' requested over {}", input.name, region);
        }

        let statistics = GlobalStatistics::precompute(&active, &self.sources)?;
        log::debug!("Statistics precomputed for {} input(s)", statistics.images().count());

        let threads = self.options.effective_threads();
        let mut pool = EvaluatorPool::prepare(threads, &templates, &active, inputs, &statistics)?;
        self.active = active.iter().map(|d| d.name.clone()).collect();

        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| BandMathError::Config(format!("cannot start {} worker thread(s): {}", threads, e)))?;

        let mut outputs = self.allocate_outputs(&output, pool.dimensions());
        let strips = output.strips(self.options.stream_lines);
        let total_strips = strips.strip_count();
        tracker.start(output.area(), total_strips);
        log::info!(
            "Evaluating {} expression(s) over {} with {} thread(s) in {} region(s)",
            self.expressions.len(),
            output,
            threads,
            total_strips
        );

        let pixel_type = self.options.pixel_type;
        for (index, strip) in strips.enumerate() {
            if tracker.is_cancelled() {
                log::info!("Run cancelled before region {}/{}", index + 1, total_strips);
                return Err(BandMathError::Cancelled {
                    completed: tracker.completed_pixels(),
                    total: tracker.total_pixels(),
                });
            }

            let strip_start = Instant::now();
            let blocks = self.request_blocks(&strip, &halos, inputs)?;
            let (bindings, dimensions, sets) = pool.split();
            let context = StripContext {
                blocks: &blocks,
                bindings,
                dimensions,
                pixel_type,
            };

            let ranges = strip.split_rows(sets.len());
            let mut slices = strip_slices(&mut outputs, &output, &strip, dimensions, sets.len());
            workers.install(|| {
                sets.par_iter_mut()
                    .zip(ranges.par_iter())
                    .zip(slices.par_iter_mut())
                    .try_for_each(|((set, rows), outs)| evaluate_rows(set, &context, *rows, outs))
            })?;

            tracker.region_completed(strip, index, total_strips, strip_start.elapsed().as_millis() as u64);
        }

        let (underflow, overflow) = pool.clamp_totals();
        if underflow > 0 || overflow > 0 {
            log::warn!(
                "Values clamped to {} range in [{}]: {} underflow(s), {} overflow(s)",
                pixel_type,
                self.expressions.join(" | "),
                underflow,
                overflow
            );
        }

        tracker.complete();
        let report = RunReport {
            pixels: output.area(),
            regions: total_strips,
            underflow,
            overflow,
            threads,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        log::info!("Band math finished in {}ms", report.duration_ms);
        Ok(RunOutput { outputs, report })
    }

    /// Checks that need no compiled expression.
    fn validate(&self, output: &Region) -> BandMathResult<()> {
        let inputs = self.registry.inputs();
        let first = inputs.first().ok_or(BandMathError::NoInputs)?;
        if self.expressions.is_empty() {
            return Err(BandMathError::NoExpressions);
        }

        let size = |info: &InputInfo| (info.extent.width, info.extent.height);
        if let Some(other) = inputs.iter().skip(1).find(|info| size(info) != size(first)) {
            return Err(BandMathError::ImageSizeMismatch {
                first: first.name.clone(),
                first_size: size(first),
                other: other.name.clone(),
                other_size: size(other),
            });
        }

        if output.is_empty() {
            return Err(BandMathError::EmptyOutputRegion { requested: *output });
        }
        if !first.extent.contains_region(output) {
            return Err(BandMathError::OutputRegionOutside {
                requested: *output,
                available: first.extent,
            });
        }
        Ok(())
    }

    /// Materialize every input over `strip` padded by its halo.
    fn request_blocks(
        &self,
        strip: &Region,
        halos: &[Halo],
        inputs: &[InputInfo],
    ) -> BandMathResult<Vec<RasterBlock>> {
        self.sources
            .iter()
            .zip(halos)
            .zip(inputs)
            .enumerate()
            .map(|(index, ((source, halo), info))| {
                let region = pad_and_crop(strip, *halo, &info.extent).map_err(|source| {
                    BandMathError::RegionNegotiation {
                        input: index,
                        name: info.name.clone(),
                        source,
                    }
                })?;
                Ok(source.request_region(region)?)
            })
            .collect()
    }

    /// One image per expression covering `output`, with the first input's
    /// spacing and an origin moved to the region's corner.
    fn allocate_outputs(&self, output: &Region, dimensions: &[usize]) -> Vec<VectorImage> {
        let mut geometry = self.sources.first().map(|s| s.geometry()).unwrap_or_default();
        geometry.origin.0 += output.x as f64 * geometry.spacing.0;
        geometry.origin.1 += output.y as f64 * geometry.spacing.1;
        dimensions
            .iter()
            .map(|&bands| VectorImage::new(output.width, output.height, bands).with_geometry(geometry))
            .collect()
    }
}

impl Default for BandMathFilter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BandMathFilter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BandMathFilter")
            .field("inputs", &self.registry.inputs())
            .field("expressions", &self.expressions)
            .field("many_expressions", &self.many_expressions)
            .field("options", &self.options)
            .finish()
    }
}

/// Cut each output's rows covering `strip` into the same row ranges as
/// [`Region::split_rows`], grouped per range.
///
/// Strips span the full output width, so a strip's rows are one contiguous
/// run of each output buffer.
fn strip_slices<'o>(
    outputs: &'o mut [VectorImage],
    output: &Region,
    strip: &Region,
    dimensions: &[usize],
    parts: usize,
) -> Vec<Vec<&'o mut [f64]>> {
    let width = output.width as usize;
    let first_row = (strip.y - output.y) as usize;
    let rows = strip.height as usize;
    let chunk_rows = strip.row_chunk_height(parts) as usize;
    let ranges = if chunk_rows == 0 { 0 } else { (rows + chunk_rows - 1) / chunk_rows };

    let mut grouped: Vec<Vec<&mut [f64]>> = (0..ranges).map(|_| Vec::with_capacity(outputs.len())).collect();
    for (image, &dimension) in outputs.iter_mut().zip(dimensions) {
        let row_len = width * dimension;
        let strip_data = &mut image.data_mut()[first_row * row_len..(first_row + rows) * row_len];
        if row_len == 0 {
            continue;
        }
        for (range, part) in strip_data.chunks_mut(chunk_rows * row_len).enumerate() {
            grouped[range].push(part);
        }
    }
    grouped
}

/// Append `text` as a new expression, or replace the single one when
/// `many` is off.
fn add_expression(expressions: &mut Vec<String>, many: bool, text: &str) {
    let expression = join_components(text);
    if expression != text {
        log::debug!("Expression '{}' rewritten as '{}'", text, expression);
    }
    if many || expressions.is_empty() {
        expressions.push(expression);
    } else {
        expressions[0] = expression;
    }
}

/// Rewrite `a ; b ; c` into `cat(a , b , c)`. Separators nested in
/// parentheses or braces are left alone.
fn join_components(text: &str) -> String {
    let mut depth = 0i32;
    let mut joined = String::with_capacity(text.len() + 5);
    let mut split = false;
    for c in text.chars() {
        match c {
            '(' | '{' => depth += 1,
            ')' | '}' => depth -= 1,
            ';' if depth == 0 => {
                split = true;
                joined.push(',');
                continue;
            }
            _ => {}
        }
        joined.push(c);
    }
    if split {
        format!("cat({})", joined)
    } else {
        text.to_string()
    }
}
