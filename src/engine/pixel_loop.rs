//! Per-pixel evaluation of one row range.
//!
//! For each pixel: refresh the per-pixel cells, evaluate every expression,
//! clamp each component to the output type and write it. Statistic,
//! spacing and user cells are left alone; they were set once at preparation.

use crate::core::error::{BandMathError, BandMathResult};
use crate::core::pixel::{clamp_to, Clamped, PixelType};
use crate::core::raster::RasterBlock;
use crate::core::region::Region;
use crate::engine::pool::{output_dimension, Binding, EvaluatorSet};
use crate::engine::registry::{Axis, VariableKind};
use crate::expr::value::Value;

/// Read-only inputs shared by every worker for one streamed region.
#[derive(Debug, Clone, Copy)]
pub struct StripContext<'a> {
    /// Materialized input regions, indexed like the inputs.
    pub blocks: &'a [RasterBlock],
    pub bindings: &'a [Binding],
    pub dimensions: &'a [usize],
    pub pixel_type: PixelType,
}

/// Evaluate every pixel of `rows`.
///
/// `outputs[i]` is the slice of expression `i`'s output covering exactly
/// `rows`, pixel-interleaved with `dimensions[i]` components.
pub fn evaluate_rows(
    set: &mut EvaluatorSet,
    context: &StripContext<'_>,
    rows: Region,
    outputs: &mut [&mut [f64]],
) -> BandMathResult<()> {
    let width = rows.width as usize;

    for y in rows.y..rows.bottom() {
        for x in rows.x..rows.right() {
            refresh(set, context, x, y);

            let pixel = (y - rows.y) as usize * width + (x - rows.x) as usize;
            for (index, out) in outputs.iter_mut().enumerate() {
                let evaluator = &set.evaluators[index];
                let value = evaluator.evaluate(&set.cells).map_err(|source| BandMathError::Evaluation {
                    expression: evaluator.text().to_string(),
                    source,
                })?;

                let expected = context.dimensions[index];
                let got = output_dimension(evaluator.text(), &value)?;
                if got != expected {
                    return Err(BandMathError::DimensionChanged {
                        expression: evaluator.text().to_string(),
                        expected,
                        got,
                        x,
                        y,
                    });
                }

                let target = &mut out[pixel * expected..(pixel + 1) * expected];
                match &value {
                    Value::Integer(i) => store(&mut target[0], *i as f64, context.pixel_type, set),
                    Value::Float(f) => store(&mut target[0], *f, context.pixel_type, set),
                    Value::Matrix(m) => {
                        for (slot, &component) in target.iter_mut().zip(m.data()) {
                            store(slot, component, context.pixel_type, set);
                        }
                    }
                    // output_dimension rejected every other type
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

/// Pull the current pixel's values into the per-pixel cells.
fn refresh(set: &mut EvaluatorSet, context: &StripContext<'_>, x: i64, y: i64) {
    for binding in context.bindings {
        match &binding.kind {
            VariableKind::Index(Axis::X) => set.cells.set(binding.cell, Value::Float(x as f64)),
            VariableKind::Index(Axis::Y) => set.cells.set(binding.cell, Value::Float(y as f64)),
            VariableKind::BandScalar { image, band } => {
                let v = context.blocks[*image].pixel(x, y)[*band];
                set.cells.set(binding.cell, Value::Float(v));
            }
            VariableKind::PixelVector { image } => {
                if let Value::Matrix(m) = set.cells.get_mut(binding.cell) {
                    m.data_mut().copy_from_slice(context.blocks[*image].pixel(x, y));
                }
            }
            VariableKind::BandNeighborhood { image, band, size } => {
                if let Value::Matrix(m) = set.cells.get_mut(binding.cell) {
                    context.blocks[*image].neighborhood(*band, x, y, size.width, size.height, m.data_mut());
                }
            }
            VariableKind::Spacing { .. }
            | VariableKind::BandStatistic { .. }
            | VariableKind::UserConstant(_)
            | VariableKind::UserMatrix(_) => {}
        }
    }
}

fn store(slot: &mut f64, value: f64, pixel_type: PixelType, set: &mut EvaluatorSet) {
    let clamped = clamp_to(pixel_type, value);
    match clamped {
        Clamped::Underflow(_) => set.underflow += 1,
        Clamped::Overflow(_) => set.overflow += 1,
        Clamped::InRange(_) => {}
    }
    *slot = clamped.value();
}
