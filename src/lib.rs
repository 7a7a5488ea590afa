//! # Bandmath - Raster Band Math
//!
//! Bandmath evaluates mathematical expressions over one or more multi-band
//! raster images and writes one output raster per expression.
//!
//! ## Features
//!
//! - **Generated variables**: every input exposes its pixel vector, bands,
//!   band neighborhoods up to 21x21, whole-image band statistics and spacing
//! - **User constants and matrices**, declared in code or imported from a
//!   context file
//! - **Multiple expressions**: one output per expression, or one wider output
//!   for a `;`-separated list
//! - **Parallel evaluation**: lock-free, one evaluator set per worker thread
//! - **Clamping**: values outside the output type's range are clamped and
//!   counted
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bandmath::prelude::*;
//!
//! let red = VectorImage::from_fn(64, 64, 1, |x, _, _| x as f64);
//! let nir = VectorImage::from_fn(64, 64, 1, |_, y, _| y as f64);
//!
//! let mut filter = BandMathFilter::new()
//!     .with_options(RunOptions::new().with_pixel_type(PixelType::F32));
//! filter.declare_input(&red, Some("red"))?;
//! filter.declare_input(&nir, Some("nir"))?;
//! filter.declare_constant("gain", 2.0)?;
//! filter.set_expression("ndvi(redb1, nirb1) * gain");
//! filter.set_expression("mean(redb1N5x5); redb1Max");
//!
//! let result = filter.run_largest()?;
//! assert_eq!(result.outputs.len(), 2);
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: errors, regions, the raster data-access layer, pixel types
//! - [`expr`]: the expression language and its evaluator
//! - [`engine`]: the registry, negotiation, statistics, evaluator pool, pixel
//!   loop and [`BandMathFilter`](engine::BandMathFilter)
//! - [`config`]: TOML run defaults

#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod engine;
pub mod expr;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use bandmath::prelude::*;
/// ```
pub mod prelude {
    // Errors
    pub use crate::core::error::{
        BandMathError, BandMathResult, ContextError, DataAccessError, ExpressionError, RegionError, RegistryError,
    };

    // Data access
    pub use crate::core::pixel::PixelType;
    pub use crate::core::raster::{ImageGeometry, RasterBlock, RasterSource, VectorImage};
    pub use crate::core::region::{Halo, Region};

    // Expressions
    pub use crate::expr::{Evaluator, Matrix, Scalar, Value};

    // Engine
    pub use crate::engine::{
        BandMathFilter, ProgressTracker, ProgressUpdate, RunOptions, RunOutput, RunReport, StatisticKind,
        VariableKind, VariableRegistry,
    };

    // Configuration
    pub use crate::config::BandMathConfig;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "bandmath");
    }

    #[test]
    fn test_prelude_pipeline() {
        let red = VectorImage::from_fn(8, 8, 1, |x, _, _| x as f64);
        let nir = VectorImage::from_fn(8, 8, 1, |_, y, _| y as f64 + 1.0);

        let mut filter = BandMathFilter::new().with_options(RunOptions::new().with_pixel_type(PixelType::F64));
        filter.declare_input(&red, Some("red")).unwrap();
        filter.declare_input(&nir, Some("nir")).unwrap();
        filter.declare_constant("gain", 2.0).unwrap();
        filter.set_expression("ndvi(redb1, nirb1) * gain");
        filter.set_expression("redb1Max; nirb1Min");

        let result = filter.run_largest().unwrap();
        assert_eq!(result.outputs.len(), 2);
        // x = 0, y = 0: ndvi(0, 1) = 1
        assert_eq!(result.outputs[0].pixel(0, 0), &[2.0]);
        assert_eq!(result.outputs[1].pixel(3, 3), &[7.0, 1.0]);
    }
}
