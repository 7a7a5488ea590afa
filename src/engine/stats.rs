//! Global statistics precomputation.
//!
//! Statistics are constants for a run, so each input referenced by at least
//! one statistic variable is reduced once, over its full extent, before any
//! worker starts. The pass reads the whole image even when the output region
//! is smaller.

use crate::core::error::DataAccessError;
use crate::core::raster::RasterSource;
use crate::core::statistics::{compute_band_statistics, BandStatistics};
use crate::engine::registry::{StatisticKind, VariableDescriptor, VariableKind};
use std::collections::BTreeMap;

/// Band statistics of the inputs that need them.
#[derive(Debug, Clone, Default)]
pub struct GlobalStatistics {
    per_image: BTreeMap<usize, Vec<BandStatistics>>,
}

impl GlobalStatistics {
    /// Reduce every input referenced by a statistic variable in `active`.
    pub fn precompute(active: &[VariableDescriptor], sources: &[&dyn RasterSource]) -> Result<Self, DataAccessError> {
        let mut per_image = BTreeMap::new();
        for descriptor in active {
            if let VariableKind::BandStatistic { image, .. } = descriptor.kind {
                if per_image.contains_key(&image) {
                    continue;
                }
                let source = sources[image];
                let start = std::time::Instant::now();
                let stats = compute_band_statistics(source)?;
                log::debug!(
                    "Statistics of input #{} ({} band(s)) computed in {:?}",
                    image,
                    stats.len(),
                    start.elapsed()
                );
                per_image.insert(image, stats);
            }
        }
        Ok(Self { per_image })
    }

    /// A statistic, if its input was reduced.
    pub fn get(&self, image: usize, band: usize, kind: StatisticKind) -> Option<f64> {
        self.per_image
            .get(&image)
            .and_then(|bands| bands.get(band))
            .map(|stats| kind.pick(stats))
    }

    /// Inputs that were reduced.
    pub fn images(&self) -> impl Iterator<Item = usize> + '_ {
        self.per_image.keys().copied()
    }
}
