//! Compiled expressions bound to per-thread value cells.
//!
//! An [`Evaluator`] is compiled once from text, then cloned for every worker.
//! Each clone binds its free identifiers to slots of the worker's own
//! [`CellSet`]; the pixel loop rewrites those slots and re-evaluates without
//! any lookup by name.

use crate::core::error::{ExpressionError, ExpressionResult};
use crate::expr::ops;
use crate::expr::parser::{parse, Expr};
use crate::expr::value::Value;
use std::borrow::Cow;

/// Index of a slot in a [`CellSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub usize);

/// Storage for the current value of every bound variable of one worker.
#[derive(Debug, Clone, Default)]
pub struct CellSet {
    values: Vec<Value>,
}

impl CellSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot holding `value`.
    pub fn push(&mut self, value: Value) -> CellId {
        self.values.push(value);
        CellId(self.values.len() - 1)
    }

    pub fn get(&self, id: CellId) -> &Value {
        &self.values[id.0]
    }

    pub fn get_mut(&mut self, id: CellId) -> &mut Value {
        &mut self.values[id.0]
    }

    pub fn set(&mut self, id: CellId, value: Value) {
        self.values[id.0] = value;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A compiled expression.
#[derive(Debug, Clone)]
pub struct Evaluator {
    text: String,
    ast: Expr,
    identifiers: Vec<String>,
}

impl Evaluator {
    /// Parse `text`. Unknown functions and syntax errors fail here.
    pub fn compile(text: &str) -> ExpressionResult<Self> {
        let ast = parse(text)?;
        let mut identifiers: Vec<String> = Vec::new();
        ast.walk(&mut |node| {
            if let Expr::Variable { name, .. } = node {
                if !identifiers.contains(name) {
                    identifiers.push(name.clone());
                }
            }
        });
        Ok(Self {
            text: text.to_string(),
            ast,
            identifiers,
        })
    }

    /// Source text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Distinct variable names, in order of first appearance.
    pub fn free_identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Bind every occurrence of `name` to `cell`. Returns false if the
    /// expression does not mention `name`.
    pub fn bind(&mut self, name: &str, cell: CellId) -> bool {
        let mut found = false;
        self.ast.walk_mut(&mut |node| {
            if let Expr::Variable { name: n, cell: slot } = node {
                if n.as_str() == name {
                    *slot = Some(cell);
                    found = true;
                }
            }
        });
        found
    }

    /// Evaluate against the current cell values.
    pub fn evaluate(&self, cells: &CellSet) -> ExpressionResult<Value> {
        eval(&self.ast, cells, false).map(Cow::into_owned)
    }

    /// Evaluate both branches of every ternary and require them to agree on
    /// shape, so a result shape that depends on the data is caught before
    /// any pixel is written.
    pub fn probe(&self, cells: &CellSet) -> ExpressionResult<Value> {
        eval(&self.ast, cells, true).map(Cow::into_owned)
    }
}

/// Literals and cells are borrowed; only computed values are owned.
fn eval<'e>(expr: &'e Expr, cells: &'e CellSet, probe: bool) -> ExpressionResult<Cow<'e, Value>> {
    match expr {
        Expr::Literal(value) => Ok(Cow::Borrowed(value)),
        Expr::Variable { name, cell } => match cell {
            Some(id) => Ok(Cow::Borrowed(cells.get(*id))),
            None => Err(ExpressionError::UnboundVariable { name: name.clone() }),
        },
        Expr::Unary { op, operand } => ops::unary(*op, eval(operand, cells, probe)?.into_owned()).map(Cow::Owned),
        Expr::Binary { op, left, right } => {
            let left = eval(left, cells, probe)?;
            match op {
                ops::BinaryOp::And => {
                    if !left.is_truthy("&&")? {
                        return Ok(Cow::Owned(Value::Boolean(false)));
                    }
                }
                ops::BinaryOp::Or => {
                    if left.is_truthy("||")? {
                        return Ok(Cow::Owned(Value::Boolean(true)));
                    }
                }
                _ => {}
            }
            let right = eval(right, cells, probe)?;
            ops::binary(*op, left.into_owned(), right.into_owned()).map(Cow::Owned)
        }
        Expr::Ternary {
            condition,
            then_branch,
            else_branch,
        } => {
            let take_then = eval(condition, cells, probe)?.is_truthy("?:")?;
            if probe {
                let then_value = eval(then_branch, cells, probe)?;
                let else_value = eval(else_branch, cells, probe)?;
                if then_value.shape() != else_value.shape() {
                    return Err(ExpressionError::InconsistentShape {
                        then_shape: then_value.shape().to_string(),
                        else_shape: else_value.shape().to_string(),
                    });
                }
                Ok(if take_then { then_value } else { else_value })
            } else if take_then {
                eval(then_branch, cells, probe)
            } else {
                eval(else_branch, cells, probe)
            }
        }
        Expr::Call { function, args } => {
            let values = args
                .iter()
                .map(|a| eval(a, cells, probe))
                .collect::<ExpressionResult<Vec<_>>>()?;
            let borrowed: Vec<&Value> = values.iter().map(|v| &**v).collect();
            function.call(&borrowed).map(Cow::Owned)
        }
        Expr::MatrixLiteral { rows } => {
            let values = rows
                .iter()
                .map(|row| row.iter().map(|e| eval(e, cells, probe).map(Cow::into_owned)).collect())
                .collect::<ExpressionResult<Vec<Vec<_>>>>()?;
            ops::matrix_literal(values).map(Cow::Owned)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::value::Matrix;

    fn bound(text: &str, values: &[(&str, Value)]) -> (Evaluator, CellSet) {
        let mut evaluator = Evaluator::compile(text).unwrap();
        let mut cells = CellSet::new();
        for (name, value) in values {
            let id = cells.push(value.clone());
            evaluator.bind(name, id);
        }
        (evaluator, cells)
    }

    #[test]
    fn test_free_identifiers_are_distinct_and_ordered() {
        let e = Evaluator::compile("im2b1 + im1b1 * im2b1 + ndvi(im1b3, im1b4) + _pi").unwrap();
        assert_eq!(e.free_identifiers(), &["im2b1", "im1b1", "im1b3", "im1b4"]);
    }

    #[test]
    fn test_cells_are_read_in_place() {
        let window = Matrix::new(21, 21, vec![2.0; 441]).unwrap();
        let (e, cells) = bound("w", &[("w", Value::Matrix(window))]);
        let value = eval(&e.ast, &cells, false).unwrap();
        assert!(matches!(value, Cow::Borrowed(_)));
        assert!(std::ptr::eq(&*value, cells.get(CellId(0))));

        let (e, cells) = bound("mean(w)", &[("w", Value::Matrix(Matrix::new(3, 3, vec![2.0; 9]).unwrap()))]);
        assert_eq!(e.evaluate(&cells).unwrap(), Value::Matrix(Matrix::row_vector(vec![2.0])));
    }

    #[test]
    fn test_evaluate_reads_cells() {
        let (e, mut cells) = bound("a - b", &[("a", Value::Float(5.0)), ("b", Value::Float(2.0))]);
        assert_eq!(e.evaluate(&cells).unwrap(), Value::Float(3.0));
        cells.set(CellId(0), Value::Float(10.0));
        assert_eq!(e.evaluate(&cells).unwrap(), Value::Float(8.0));
    }

    #[test]
    fn test_unbound_variable() {
        let e = Evaluator::compile("a + 1").unwrap();
        let err = e.evaluate(&CellSet::new()).unwrap_err();
        assert!(matches!(err, ExpressionError::UnboundVariable { .. }));
    }

    #[test]
    fn test_clones_bind_independently() {
        let template = Evaluator::compile("x * 2").unwrap();
        let mut first = template.clone();
        let mut second = template;
        let mut cells_a = CellSet::new();
        let mut cells_b = CellSet::new();
        first.bind("x", cells_a.push(Value::Integer(1)));
        second.bind("x", cells_b.push(Value::Integer(7)));
        assert_eq!(first.evaluate(&cells_a).unwrap(), Value::Integer(2));
        assert_eq!(second.evaluate(&cells_b).unwrap(), Value::Integer(14));
    }

    #[test]
    fn test_probe_rejects_data_dependent_shape() {
        let v = Value::Matrix(Matrix::row_vector(vec![1.0, 2.0]));
        let (e, cells) = bound("c > 0 ? v : 0", &[("c", Value::Float(0.1)), ("v", v)]);
        assert!(e.evaluate(&cells).is_ok());
        let err = e.probe(&cells).unwrap_err();
        assert!(matches!(err, ExpressionError::InconsistentShape { .. }));
    }

    #[test]
    fn test_probe_accepts_consistent_branches() {
        let (e, cells) = bound("c > 0.5 ? 255 : 0", &[("c", Value::Float(0.1))]);
        assert_eq!(e.probe(&cells).unwrap(), Value::Integer(0));
    }

    #[test]
    fn test_short_circuit() {
        let (e, cells) = bound("0 && sqrt(v)", &[("v", Value::Matrix(Matrix::row_vector(vec![1.0, 2.0])))]);
        assert_eq!(e.evaluate(&cells).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn test_matrix_expressions() {
        let (e, cells) = bound("{1, 0; 0, 1} * m", &[("m", Value::Matrix(Matrix::new(2, 1, vec![3.0, 4.0]).unwrap()))]);
        assert_eq!(
            e.evaluate(&cells).unwrap(),
            Value::Matrix(Matrix::new(2, 1, vec![3.0, 4.0]).unwrap())
        );
    }
}
