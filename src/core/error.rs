//! Error types for bandmath.
//!
//! Uses thiserror for structured errors with context. Errors are designed to:
//! - Carry the offending names, input indices and regions so a failure can be
//!   reproduced without re-running
//! - Report every offending identifier found in one pass, not just the first
//! - Support error chaining for context

use crate::core::region::Region;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for bandmath.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum BandMathError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Data access error: {0}")]
    DataAccess(#[from] DataAccessError),

    #[error("Input #{input} '{name}': {source}")]
    RegionNegotiation {
        input: usize,
        name: String,
        source: RegionError,
    },

    #[error("No input image declared")]
    NoInputs,

    #[error("No expression set; please set at least one expression")]
    NoExpressions,

    #[error(
        "Input images must have the same dimensions: '{first}' is {}x{}, '{other}' is {}x{}",
        .first_size.0, .first_size.1, .other_size.0, .other_size.1
    )]
    ImageSizeMismatch {
        first: String,
        first_size: (u32, u32),
        other: String,
        other_size: (u32, u32),
    },

    #[error("Output region {requested} is not inside the input extent {available}")]
    OutputRegionOutside { requested: Region, available: Region },

    #[error("Output region {requested} has no pixels")]
    EmptyOutputRegion { requested: Region },

    #[error("Expression '{expression}': {type_name} results are not supported")]
    UnsupportedResultType {
        expression: String,
        type_name: &'static str,
    },

    #[error("Expression '{expression}': result of the evaluation can't be a {rows}x{cols} matrix")]
    MatrixResult {
        expression: String,
        rows: usize,
        cols: usize,
    },

    #[error(
        "Expression '{expression}' changed dimension at pixel ({x}, {y}): expected {expected}, got {got}"
    )]
    DimensionChanged {
        expression: String,
        expected: usize,
        got: usize,
        x: i64,
        y: i64,
    },

    #[error("Expression '{expression}': {source}")]
    Evaluation {
        expression: String,
        source: ExpressionError,
    },

    #[error("Expression mode cannot change once {count} expression(s) are set")]
    ModeChangeAfterExpressions { count: usize },

    #[error("Run cancelled after {completed}/{total} pixels")]
    Cancelled { completed: u64, total: u64 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while declaring or resolving variables.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegistryError {
    #[error("Variable name '{name}' already used")]
    DuplicateVariable { name: String },

    #[error("Invalid variable name '{name}'")]
    InvalidName { name: String },

    #[error("Following variables not allowed: {}", .names.join(" "))]
    UnknownVariables { names: Vec<String> },

    #[error("Each row must have the same number of cols: {definition}")]
    RaggedMatrix { definition: String },

    #[error("Invalid matrix definition '{definition}': {reason}")]
    InvalidMatrixDefinition { definition: String, reason: String },

    #[error("Matrix '{name}' declared {rows}x{cols} but {len} values were given")]
    MatrixShape {
        name: String,
        rows: usize,
        cols: usize,
        len: usize,
    },
}

/// Errors from halo negotiation.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionError {
    #[error(
        "Region outside available extent: requested {requested} for a {}x{} neighborhood, available {available}",
        .window.0, .window.1
    )]
    OutsideAvailableExtent {
        requested: Region,
        available: Region,
        window: (u32, u32),
    },
}

/// Errors raised by the expression evaluator.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpressionError {
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("Function '{function}' expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: String,
        got: usize,
    },

    #[error("Operation '{operation}' does not accept {found}")]
    TypeMismatch { operation: String, found: String },

    #[error("Operation '{operation}' got incompatible shapes {}x{} and {}x{}", .left.0, .left.1, .right.0, .right.1)]
    ShapeMismatch {
        operation: String,
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("Band index {band} out of range (1..={bands})")]
    BandOutOfRange { band: i64, bands: usize },

    #[error("Variable '{name}' is not bound to a cell")]
    UnboundVariable { name: String },

    #[error("Result shape depends on the data: one branch yields {then_shape}, the other {else_shape}")]
    InconsistentShape {
        then_shape: String,
        else_shape: String,
    },
}

/// Errors raised while importing or exporting a context file.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Could not open '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Line {line}: please, set the name and the value of the constant")]
    MissingName { line: usize },

    #[error("Line {line}: please, set the value of '{name}'")]
    MissingValue { line: usize, name: String },

    #[error("Line {line}: '{text}' is not a valid number")]
    InvalidNumber { line: usize, text: String },

    #[error("Line {line}: symbol #I/#F found, but found a vector/matrix definition")]
    MatrixWhereScalarExpected { line: usize },

    #[error("Line {line}: symbol #M found, but couldn't find the definition of '{name}'")]
    MissingMatrixDefinition { line: usize, name: String },

    #[error("Line {line}: symbol #E found, but couldn't find any expression")]
    MissingExpression { line: usize },

    #[error("Line {line}: {source}")]
    Directive { line: usize, source: RegistryError },

    #[error("No constant or expression could be set; please, ensure that '{origin}' is correct")]
    NothingToImport { origin: String },

    #[error("Constant '{name}' holds a value that cannot be exported")]
    UnsupportedConstant { name: String },
}

/// Errors from the raster data-access layer.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataAccessError {
    #[error("Requested region {requested} cannot be satisfied from {available}")]
    RegionUnavailable { requested: Region, available: Region },

    #[error("Band index {band} out of range (image has {bands} band(s))")]
    BandOutOfRange { band: usize, bands: usize },

    #[error("Buffer of {len} values does not match a {width}x{height}x{bands} image")]
    BufferSize {
        len: usize,
        width: u32,
        height: u32,
        bands: usize,
    },

    #[error("Cannot encode {bands} band(s) as {pixel_type}")]
    UnsupportedEncoding { bands: usize, pixel_type: String },
}

// ============================================================================
// Error Utilities
// ============================================================================

impl BandMathError {
    /// Whether the error is raised before any worker thread starts.
    pub fn is_preparation_error(&self) -> bool {
        matches!(
            self,
            BandMathError::Registry(_)
                | BandMathError::Expression(_)
                | BandMathError::Context(_)
                | BandMathError::RegionNegotiation { .. }
                | BandMathError::NoInputs
                | BandMathError::NoExpressions
                | BandMathError::ImageSizeMismatch { .. }
                | BandMathError::OutputRegionOutside { .. }
                | BandMathError::EmptyOutputRegion { .. }
                | BandMathError::UnsupportedResultType { .. }
                | BandMathError::MatrixResult { .. }
                | BandMathError::ModeChangeAfterExpressions { .. }
                | BandMathError::Config(_)
        )
    }

    /// Get suggestion for fixing this error.
    pub fn suggested_fix(&self) -> Option<String> {
        match self {
            BandMathError::Registry(RegistryError::UnknownVariables { names }) => Some(format!(
                "Declare {} as constant(s) or check the input prefixes",
                names.join(", ")
            )),
            BandMathError::Registry(RegistryError::DuplicateVariable { name }) => {
                Some(format!("Rename '{}' or give the input a different prefix", name))
            }
            BandMathError::RegionNegotiation { name, .. } => Some(format!(
                "Use a smaller neighborhood on '{}' or a larger input",
                name
            )),
            BandMathError::ImageSizeMismatch { other, .. } => {
                Some(format!("Resample '{}' to the size of the first input", other))
            }
            _ => None,
        }
    }
}

/// Result type alias for bandmath operations.
pub type BandMathResult<T> = Result<T, BandMathError>;

/// Result type alias for expression evaluation.
pub type ExpressionResult<T> = Result<T, ExpressionError>;
