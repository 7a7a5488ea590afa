//! Per-thread evaluator sets.
//!
//! Every worker owns one [`EvaluatorSet`]: its own cell for each active
//! variable and its own clone of each compiled expression, bound to those
//! cells. Nothing in a set is shared, so the pixel loop takes no lock. Memory
//! grows with `threads x (variables + expressions)`.
//!
//! Cells are pushed in the same order in every set, so a [`Binding`]'s
//! [`CellId`] is valid for all of them.

use crate::core::error::{BandMathError, BandMathResult};
use crate::engine::registry::{Axis, InputInfo, VariableDescriptor, VariableKind};
use crate::engine::stats::GlobalStatistics;
use crate::expr::evaluator::{CellId, CellSet, Evaluator};
use crate::expr::value::{Matrix, Value};

/// An active variable and the cell that holds it.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub kind: VariableKind,
    pub cell: CellId,
}

/// Values handed to per-pixel cells before the first real pixel is read.
///
/// Distinct values keep trial comparisons between two variables from being
/// trivially equal.
struct Placeholders {
    next: f64,
}

impl Placeholders {
    fn new() -> Self {
        Self { next: 0.1 }
    }

    fn take(&mut self) -> f64 {
        let value = self.next;
        self.next += 0.001;
        if self.next >= 1.0 {
            self.next = 0.1;
        }
        value
    }

    fn matrix(&mut self, rows: usize, cols: usize) -> Matrix {
        let mut m = Matrix::filled(rows, cols, 0.0);
        for v in m.data_mut() {
            *v = self.take();
        }
        m
    }
}

/// One worker's private evaluation state.
#[derive(Debug, Clone)]
pub struct EvaluatorSet {
    pub cells: CellSet,
    pub evaluators: Vec<Evaluator>,
    pub underflow: u64,
    pub overflow: u64,
}

/// All evaluator sets of a run plus what they share read-only.
#[derive(Debug)]
pub struct EvaluatorPool {
    bindings: Vec<Binding>,
    sets: Vec<EvaluatorSet>,
    dimensions: Vec<usize>,
}

impl EvaluatorPool {
    /// Build `threads` evaluator sets and fix every expression's output
    /// dimension with one trial evaluation.
    ///
    /// Statistic, spacing and user cells receive their real values here and
    /// are never written again.
    pub fn prepare(
        threads: usize,
        templates: &[Evaluator],
        active: &[VariableDescriptor],
        inputs: &[InputInfo],
        statistics: &GlobalStatistics,
    ) -> BandMathResult<Self> {
        let mut placeholders = Placeholders::new();
        let mut cells = CellSet::new();
        let mut bindings = Vec::with_capacity(active.len());

        for descriptor in active {
            let value = initial_value(&descriptor.kind, inputs, statistics, &mut placeholders);
            let cell = cells.push(value);
            bindings.push(Binding {
                name: descriptor.name.clone(),
                kind: descriptor.kind.clone(),
                cell,
            });
        }

        let mut bound = Vec::with_capacity(templates.len());
        for template in templates {
            let mut evaluator = template.clone();
            for binding in &bindings {
                evaluator.bind(&binding.name, binding.cell);
            }
            bound.push(evaluator);
        }

        let mut dimensions = Vec::with_capacity(bound.len());
        for evaluator in &bound {
            let value = evaluator.probe(&cells).map_err(|source| BandMathError::Evaluation {
                expression: evaluator.text().to_string(),
                source,
            })?;
            let dimension = output_dimension(evaluator.text(), &value)?;
            log::debug!("Expression '{}' yields {} component(s)", evaluator.text(), dimension);
            dimensions.push(dimension);
        }

        let threads = threads.max(1);
        let template_set = EvaluatorSet {
            cells,
            evaluators: bound,
            underflow: 0,
            overflow: 0,
        };
        let sets = vec![template_set; threads];

        Ok(Self {
            bindings,
            sets,
            dimensions,
        })
    }

    /// Active variables and their cells.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Output components of each expression.
    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    /// Number of evaluator sets.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Shared bindings and dimensions next to the mutable sets, so workers
    /// can borrow both at once.
    pub fn split(&mut self) -> (&[Binding], &[usize], &mut [EvaluatorSet]) {
        (&self.bindings, &self.dimensions, &mut self.sets)
    }

    /// Sum of all threads' `(underflow, overflow)` counters.
    pub fn clamp_totals(&self) -> (u64, u64) {
        self.sets
            .iter()
            .fold((0, 0), |(u, o), set| (u + set.underflow, o + set.overflow))
    }
}

fn initial_value(
    kind: &VariableKind,
    inputs: &[InputInfo],
    statistics: &GlobalStatistics,
    placeholders: &mut Placeholders,
) -> Value {
    match kind {
        VariableKind::Index(_) | VariableKind::BandScalar { .. } => Value::Float(placeholders.take()),
        VariableKind::Spacing { image, axis } => {
            let spacing = inputs[*image].geometry.spacing;
            Value::Float(match axis {
                Axis::X => spacing.0,
                Axis::Y => spacing.1,
            })
        }
        VariableKind::PixelVector { image } => Value::Matrix(placeholders.matrix(1, inputs[*image].bands)),
        VariableKind::BandNeighborhood { size, .. } => {
            Value::Matrix(placeholders.matrix(size.height as usize, size.width as usize))
        }
        VariableKind::BandStatistic { image, band, statistic } => {
            Value::Float(statistics.get(*image, *band, *statistic).unwrap_or(f64::NAN))
        }
        VariableKind::UserConstant(scalar) => Value::from(*scalar),
        VariableKind::UserMatrix(matrix) => Value::Matrix(matrix.clone()),
    }
}

/// Number of output components for an evaluation result.
///
/// Integers and floats give one component and a `1 x N` vector gives `N`.
/// Booleans, complex numbers, empty vectors and matrices with more than one
/// row are rejected.
pub fn output_dimension(expression: &str, value: &Value) -> BandMathResult<usize> {
    match value {
        Value::Integer(_) | Value::Float(_) => Ok(1),
        Value::Matrix(m) if m.rows() == 1 && m.cols() > 0 => Ok(m.cols()),
        Value::Matrix(m) => Err(BandMathError::MatrixResult {
            expression: expression.to_string(),
            rows: m.rows(),
            cols: m.cols(),
        }),
        other => Err(BandMathError::UnsupportedResultType {
            expression: expression.to_string(),
            type_name: other.type_name(),
        }),
    }
}
