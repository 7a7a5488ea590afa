//! Values produced and consumed by the expression evaluator.
//!
//! The value set is closed: scalars (integer, float, boolean, complex) and
//! dense row-major matrices. A `1 x N` matrix is a vector; pixel vectors are
//! exposed this way and vector results become multi-band output pixels.

use crate::core::error::{ExpressionError, ExpressionResult};
use std::fmt;

/// A dense row-major matrix of floats.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Build from row-major data. Returns `None` if the sizes disagree.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        if data.len() != rows * cols {
            return None;
        }
        Some(Self { rows, cols, data })
    }

    /// A matrix with every element set to `value`.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// A `1 x N` row vector.
    pub fn row_vector(data: Vec<f64>) -> Self {
        Self {
            rows: 1,
            cols: data.len(),
            data,
        }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the matrix has no element.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the matrix has a single row.
    pub fn is_row_vector(&self) -> bool {
        self.rows == 1
    }

    /// Element at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Row-major elements.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Mutable row-major elements.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Matrix {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Combine two same-shaped matrices element by element.
    pub fn zip_with(&self, other: &Matrix, operation: &str, f: impl Fn(f64, f64) -> f64) -> ExpressionResult<Matrix> {
        if self.shape() != other.shape() {
            return Err(ExpressionError::ShapeMismatch {
                operation: operation.to_string(),
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().zip(&other.data).map(|(&a, &b)| f(a, b)).collect(),
        })
    }

    /// Matrix product.
    pub fn product(&self, other: &Matrix) -> ExpressionResult<Matrix> {
        if self.cols != other.rows {
            return Err(ExpressionError::ShapeMismatch {
                operation: "*".to_string(),
                left: self.shape(),
                right: other.shape(),
            });
        }
        let mut data = vec![0.0; self.rows * other.cols];
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self.get(i, k);
                for j in 0..other.cols {
                    data[i * other.cols + j] += a * other.get(k, j);
                }
            }
        }
        Ok(Matrix {
            rows: self.rows,
            cols: other.cols,
            data,
        })
    }
}

impl fmt::Display for Matrix {
    /// Formats as `{ a , b ; c , d }`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for row in 0..self.rows {
            if row > 0 {
                f.write_str(" ;")?;
            }
            for col in 0..self.cols {
                if col > 0 {
                    f.write_str(" ,")?;
                }
                write!(f, " {}", self.get(row, col))?;
            }
        }
        f.write_str(" }")
    }
}

/// Result or operand of an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    /// Result of a comparison or logical operator
    Boolean(bool),
    /// Complex number
    Complex { re: f64, im: f64 },
    /// Dense matrix; a single row is a vector
    Matrix(Matrix),
}

/// Shape of a value, ignoring its scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Any scalar.
    Scalar,
    /// A `rows x cols` matrix.
    Matrix(usize, usize),
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => f.write_str("a scalar"),
            Shape::Matrix(r, c) => write!(f, "a {}x{} matrix", r, c),
        }
    }
}

impl Value {
    /// Name of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Complex { .. } => "complex",
            Value::Matrix(_) => "matrix",
        }
    }

    /// Shape of the value.
    pub fn shape(&self) -> Shape {
        match self {
            Value::Matrix(m) => Shape::Matrix(m.rows(), m.cols()),
            _ => Shape::Scalar,
        }
    }

    /// Real scalar view. Booleans count as 0/1 and a `1 x 1` matrix as its
    /// only element.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Matrix(m) if m.len() == 1 => Some(m.data()[0]),
            _ => None,
        }
    }

    /// Real scalar view, or a type error naming `operation`.
    pub fn expect_real(&self, operation: &str) -> ExpressionResult<f64> {
        self.as_real().ok_or_else(|| ExpressionError::TypeMismatch {
            operation: operation.to_string(),
            found: self.type_name().to_string(),
        })
    }

    /// Matrix view, or a type error naming `operation`.
    pub fn expect_matrix(&self, operation: &str) -> ExpressionResult<&Matrix> {
        match self {
            Value::Matrix(m) => Ok(m),
            other => Err(ExpressionError::TypeMismatch {
                operation: operation.to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Truth value used by `?:`, `&&`, `||` and `!`.
    pub fn is_truthy(&self, operation: &str) -> ExpressionResult<bool> {
        self.expect_real(operation).map(|v| v != 0.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Complex { re, im } => write!(f, "({}, {})", re, im),
            Value::Matrix(m) => write!(f, "{}", m),
        }
    }
}

/// A user constant: integer or float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Integer(i64),
    Float(f64),
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Integer(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Integer(v as i64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Integer(i) => Value::Integer(i),
            Scalar::Float(f) => Value::Float(f),
        }
    }
}
