//! Operator semantics over [`Value`]s.

use crate::core::error::{ExpressionError, ExpressionResult};
use crate::expr::value::{Matrix, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    /// Element-wise multiplication (`mlt`)
    ElemMul,
    /// Element-wise division (`dv`)
    ElemDiv,
    /// Element-wise power (`pw`)
    ElemPow,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    And,
    Or,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
        })
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::ElemMul => "mlt",
            BinaryOp::ElemDiv => "dv",
            BinaryOp::ElemPow => "pw",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        })
    }
}

fn mismatch(op: impl fmt::Display, value: &Value) -> ExpressionError {
    ExpressionError::TypeMismatch {
        operation: op.to_string(),
        found: value.type_name().to_string(),
    }
}

pub fn unary(op: UnaryOp, operand: Value) -> ExpressionResult<Value> {
    match (op, operand) {
        (UnaryOp::Plus, v) => Ok(v),
        (UnaryOp::Neg, Value::Integer(i)) => Ok(i
            .checked_neg()
            .map(Value::Integer)
            .unwrap_or(Value::Float(-(i as f64)))),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, Value::Boolean(b)) => Ok(Value::Integer(-(b as i64))),
        (UnaryOp::Neg, Value::Complex { re, im }) => Ok(Value::Complex { re: -re, im: -im }),
        (UnaryOp::Neg, Value::Matrix(m)) => Ok(Value::Matrix(m.map(|v| -v))),
        (UnaryOp::Not, v) => Ok(Value::Boolean(!v.is_truthy("!")?)),
    }
}

/// Apply a non short-circuiting binary operator.
pub fn binary(op: BinaryOp, left: Value, right: Value) -> ExpressionResult<Value> {
    match op {
        BinaryOp::Add | BinaryOp::Sub => additive(op, left, right),
        BinaryOp::Mul => multiply(left, right),
        BinaryOp::Div => divide(left, right),
        BinaryOp::Pow => {
            let base = left.expect_real("^")?;
            let exponent = right.expect_real("^")?;
            Ok(Value::Float(base.powf(exponent)))
        }
        BinaryOp::ElemMul => elementwise(op, left, right, |a, b| a * b),
        BinaryOp::ElemDiv => elementwise(op, left, right, |a, b| a / b),
        BinaryOp::ElemPow => elementwise(op, left, right, f64::powf),
        BinaryOp::Equal | BinaryOp::NotEqual => {
            let equal = match (&left, &right) {
                (Value::Matrix(a), Value::Matrix(b)) => a == b,
                (Value::Complex { re: a, im: b }, Value::Complex { re: c, im: d }) => a == c && b == d,
                _ => left.expect_real(&op.to_string())? == right.expect_real(&op.to_string())?,
            };
            Ok(Value::Boolean(if op == BinaryOp::Equal { equal } else { !equal }))
        }
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            let name = op.to_string();
            let a = left.expect_real(&name)?;
            let b = right.expect_real(&name)?;
            Ok(Value::Boolean(match op {
                BinaryOp::Less => a < b,
                BinaryOp::LessEqual => a <= b,
                BinaryOp::Greater => a > b,
                _ => a >= b,
            }))
        }
        BinaryOp::And => Ok(Value::Boolean(left.is_truthy("&&")? && right.is_truthy("&&")?)),
        BinaryOp::Or => Ok(Value::Boolean(left.is_truthy("||")? || right.is_truthy("||")?)),
    }
}

fn complex_parts(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::Complex { re, im } => Some((*re, *im)),
        other => other.as_real().map(|r| (r, 0.0)),
    }
}

fn is_complex(value: &Value) -> bool {
    matches!(value, Value::Complex { .. })
}

fn additive(op: BinaryOp, left: Value, right: Value) -> ExpressionResult<Value> {
    let sign = if op == BinaryOp::Add { 1.0 } else { -1.0 };
    match (&left, &right) {
        (Value::Integer(a), Value::Integer(b)) => {
            let exact = if op == BinaryOp::Add { a.checked_add(*b) } else { a.checked_sub(*b) };
            Ok(exact
                .map(Value::Integer)
                .unwrap_or(Value::Float(*a as f64 + sign * *b as f64)))
        }
        (Value::Matrix(a), Value::Matrix(b)) => {
            let name = op.to_string();
            Ok(Value::Matrix(a.zip_with(b, &name, |x, y| x + sign * y)?))
        }
        (Value::Matrix(m), scalar) => {
            let s = scalar.expect_real(&op.to_string())?;
            Ok(Value::Matrix(m.map(|x| x + sign * s)))
        }
        (scalar, Value::Matrix(m)) => {
            let s = scalar.expect_real(&op.to_string())?;
            Ok(Value::Matrix(m.map(|x| s + sign * x)))
        }
        _ if is_complex(&left) || is_complex(&right) => {
            let (a, b) = complex_parts(&left).ok_or_else(|| mismatch(op, &left))?;
            let (c, d) = complex_parts(&right).ok_or_else(|| mismatch(op, &right))?;
            Ok(Value::Complex {
                re: a + sign * c,
                im: b + sign * d,
            })
        }
        _ => {
            let name = op.to_string();
            Ok(Value::Float(left.expect_real(&name)? + sign * right.expect_real(&name)?))
        }
    }
}

fn multiply(left: Value, right: Value) -> ExpressionResult<Value> {
    match (&left, &right) {
        (Value::Integer(a), Value::Integer(b)) => Ok(a
            .checked_mul(*b)
            .map(Value::Integer)
            .unwrap_or(Value::Float(*a as f64 * *b as f64))),
        (Value::Matrix(a), Value::Matrix(b)) => Ok(Value::Matrix(a.product(b)?)),
        (Value::Matrix(m), scalar) | (scalar, Value::Matrix(m)) => {
            let s = scalar.expect_real("*")?;
            Ok(Value::Matrix(m.map(|x| x * s)))
        }
        _ if is_complex(&left) || is_complex(&right) => {
            let (a, b) = complex_parts(&left).ok_or_else(|| mismatch("*", &left))?;
            let (c, d) = complex_parts(&right).ok_or_else(|| mismatch("*", &right))?;
            Ok(Value::Complex {
                re: a * c - b * d,
                im: a * d + b * c,
            })
        }
        _ => Ok(Value::Float(left.expect_real("*")? * right.expect_real("*")?)),
    }
}

fn divide(left: Value, right: Value) -> ExpressionResult<Value> {
    match (&left, &right) {
        (Value::Matrix(m), scalar) => {
            let s = scalar.expect_real("/")?;
            Ok(Value::Matrix(m.map(|x| x / s)))
        }
        (_, Value::Matrix(_)) => Err(mismatch("/", &right)),
        _ if is_complex(&left) || is_complex(&right) => {
            let (a, b) = complex_parts(&left).ok_or_else(|| mismatch("/", &left))?;
            let (c, d) = complex_parts(&right).ok_or_else(|| mismatch("/", &right))?;
            let denom = c * c + d * d;
            Ok(Value::Complex {
                re: (a * c + b * d) / denom,
                im: (b * c - a * d) / denom,
            })
        }
        _ => Ok(Value::Float(left.expect_real("/")? / right.expect_real("/")?)),
    }
}

/// Element-wise operator. A scalar or `1 x 1` operand is broadcast.
fn elementwise(op: BinaryOp, left: Value, right: Value, f: fn(f64, f64) -> f64) -> ExpressionResult<Value> {
    let name = op.to_string();
    match (&left, &right) {
        (Value::Matrix(a), Value::Matrix(b)) if a.shape() == b.shape() => Ok(Value::Matrix(a.zip_with(b, &name, f)?)),
        (Value::Matrix(a), Value::Matrix(b)) if b.len() == 1 => {
            let s = b.data()[0];
            Ok(Value::Matrix(a.map(|x| f(x, s))))
        }
        (Value::Matrix(a), Value::Matrix(b)) => Ok(Value::Matrix(a.zip_with(b, &name, f)?)),
        (Value::Matrix(m), scalar) => {
            let s = scalar.expect_real(&name)?;
            Ok(Value::Matrix(m.map(|x| f(x, s))))
        }
        (scalar, Value::Matrix(m)) => {
            let s = scalar.expect_real(&name)?;
            Ok(Value::Matrix(m.map(|x| f(s, x))))
        }
        _ => Ok(Value::Float(f(left.expect_real(&name)?, right.expect_real(&name)?))),
    }
}

/// Build a matrix from evaluated literal rows.
pub fn matrix_literal(rows: Vec<Vec<Value>>) -> ExpressionResult<Value> {
    let cols = rows.first().map_or(0, Vec::len);
    let mut data = Vec::with_capacity(rows.len() * cols);
    for (r, row) in rows.iter().enumerate() {
        if row.len() != cols {
            return Err(ExpressionError::ShapeMismatch {
                operation: "{}".to_string(),
                left: (r, cols),
                right: (1, row.len()),
            });
        }
        for value in row {
            data.push(value.expect_real("{}")?);
        }
    }
    Matrix::new(rows.len(), cols, data)
        .map(Value::Matrix)
        .ok_or_else(|| ExpressionError::TypeMismatch {
            operation: "{}".to_string(),
            found: "an empty matrix".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[f64]) -> Value {
        Value::Matrix(Matrix::row_vector(values.to_vec()))
    }

    #[test]
    fn test_integer_arithmetic_stays_integer() {
        assert_eq!(binary(BinaryOp::Add, Value::Integer(2), Value::Integer(3)).unwrap(), Value::Integer(5));
        assert_eq!(binary(BinaryOp::Div, Value::Integer(3), Value::Integer(2)).unwrap(), Value::Float(1.5));
        assert_eq!(
            binary(BinaryOp::Mul, Value::Integer(i64::MAX), Value::Integer(2)).unwrap(),
            Value::Float(i64::MAX as f64 * 2.0)
        );
    }

    #[test]
    fn test_matrix_broadcast() {
        assert_eq!(binary(BinaryOp::Add, row(&[1.0, 2.0]), Value::Integer(1)).unwrap(), row(&[2.0, 3.0]));
        assert_eq!(binary(BinaryOp::Sub, Value::Integer(5), row(&[1.0, 2.0])).unwrap(), row(&[4.0, 3.0]));
        assert_eq!(binary(BinaryOp::Mul, Value::Float(2.0), row(&[1.0, 2.0])).unwrap(), row(&[2.0, 4.0]));
    }

    #[test]
    fn test_elementwise_operators() {
        let a = row(&[2.0, 3.0]);
        let b = row(&[4.0, 5.0]);
        assert_eq!(binary(BinaryOp::ElemMul, a.clone(), b.clone()).unwrap(), row(&[8.0, 15.0]));
        assert_eq!(binary(BinaryOp::ElemDiv, b, a.clone()).unwrap(), row(&[2.0, 5.0 / 3.0]));
        assert_eq!(binary(BinaryOp::ElemPow, a, Value::Integer(2)).unwrap(), row(&[4.0, 9.0]));
        assert!(binary(BinaryOp::ElemMul, row(&[1.0, 2.0]), row(&[1.0, 2.0, 3.0])).is_err());
    }

    #[test]
    fn test_complex() {
        let i = Value::Complex { re: 0.0, im: 1.0 };
        assert_eq!(
            binary(BinaryOp::Mul, i.clone(), i).unwrap(),
            Value::Complex { re: -1.0, im: 0.0 }
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            binary(BinaryOp::Less, Value::Integer(1), Value::Float(1.5)).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(unary(UnaryOp::Not, Value::Float(0.0)).unwrap(), Value::Boolean(true));
        assert!(binary(BinaryOp::Less, row(&[1.0, 2.0]), Value::Integer(1)).is_err());
    }

    #[test]
    fn test_ragged_literal() {
        let rows = vec![
            vec![Value::Integer(1), Value::Integer(2)],
            vec![Value::Integer(3)],
        ];
        assert!(matrix_literal(rows).is_err());
    }
}
