//! The band math engine.
//!
//! This module provides:
//! - The variable registry and name resolution
//! - Halo negotiation and global statistics precomputation
//! - Per-thread evaluator sets and the pixel loop
//! - Progress tracking, run options and context files
//! - [`BandMathFilter`], which ties them together

pub mod context;
pub mod filter;
pub mod halo;
pub mod options;
pub mod pixel_loop;
pub mod pool;
pub mod progress;
pub mod registry;
pub mod stats;

pub use context::{parse_context, write_context, ContextLine, Directive};
pub use filter::{BandMathFilter, RunOutput, RunReport};
pub use halo::{compute_required_regions, required_halos};
pub use options::{RunOptions, DEFAULT_STREAM_LINES};
pub use pool::{output_dimension, Binding, EvaluatorPool, EvaluatorSet};
pub use progress::{ProgressCallback, ProgressTracker, ProgressUpdate};
pub use registry::{
    parse_matrix_definition, Axis, InputInfo, NeighborhoodSize, StatisticKind, VariableDescriptor, VariableKind,
    VariableRegistry, MAX_NEIGHBORHOOD_RADIUS,
};
pub use stats::GlobalStatistics;
