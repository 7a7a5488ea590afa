//! Core types for the bandmath engine.
//!
//! This module contains the foundational types shared by the evaluator and the
//! engine including:
//! - Error types
//! - Regions and neighborhood halos
//! - The raster data-access layer and the in-memory image
//! - Output pixel types and clamping
//! - Per-band statistics

pub mod error;
pub mod pixel;
pub mod raster;
pub mod region;
pub mod statistics;

// Re-export commonly used types
pub use error::{BandMathError, BandMathResult, ContextError, DataAccessError, ExpressionError, RegionError, RegistryError};
pub use pixel::{clamp_to, Clamped, PixelType};
pub use raster::{ImageGeometry, RasterBlock, RasterSource, VectorImage};
pub use region::{pad_and_crop, Halo, Region, StripIterator};
pub use statistics::{compute_band_statistics, BandStatistics};
