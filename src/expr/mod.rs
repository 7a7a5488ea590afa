//! Expression language: values, parsing, operators, built-in functions and
//! the cell-bound evaluator.

pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod value;

pub use evaluator::{CellId, CellSet, Evaluator};
pub use functions::{function_names, Function};
pub use value::{Matrix, Scalar, Shape, Value};
