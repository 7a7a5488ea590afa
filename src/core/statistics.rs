//! One-pass per-band statistics over a whole raster.

use crate::core::error::DataAccessError;
use crate::core::raster::RasterSource;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Summary statistics of one band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandStatistics {
    /// Number of pixels reduced.
    pub count: u64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sum of all values.
    pub sum: f64,
    /// Unbiased variance (divides by `count - 1`); zero for a single pixel.
    pub variance: f64,
}

/// Running moments for one band, mergeable across workers.
#[derive(Debug, Clone, Copy)]
struct Moments {
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
    mean: f64,
    m2: f64,
}

impl Moments {
    fn new() -> Self {
        Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            mean: 0.0,
            m2: 0.0,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    // Chan et al. parallel combination.
    fn merge(self, other: Moments) -> Moments {
        if self.count == 0 {
            return other;
        }
        if other.count == 0 {
            return self;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * other.count as f64 / count as f64;
        let m2 = self.m2
            + other.m2
            + delta * delta * (self.count as f64 * other.count as f64) / count as f64;
        Moments {
            count,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            sum: self.sum + other.sum,
            mean,
            m2,
        }
    }

    fn finish(&self) -> BandStatistics {
        let variance = if self.count > 1 {
            self.m2 / (self.count - 1) as f64
        } else {
            0.0
        };
        let mean = if self.count > 0 {
            self.sum / self.count as f64
        } else {
            f64::NAN
        };
        BandStatistics {
            count: self.count,
            min: self.min,
            max: self.max,
            mean,
            sum: self.sum,
            variance,
        }
    }
}

/// Reduce every band of `source` over its full extent in a single pass.
///
/// Rows are reduced in parallel on the current rayon pool, then merged in row
/// order so the result does not depend on how the work was split.
pub fn compute_band_statistics(source: &dyn RasterSource) -> Result<Vec<BandStatistics>, DataAccessError> {
    let region = source.largest_region();
    let bands = source.band_count();
    let block = source.request_region(region)?;
    let row_len = region.width as usize * bands;

    if row_len == 0 {
        return Ok(vec![Moments::new().finish(); bands]);
    }

    let rows: Vec<Vec<Moments>> = block
        .data()
        .par_chunks(row_len)
        .map(|row| {
            let mut acc = vec![Moments::new(); bands];
            for pixel in row.chunks_exact(bands) {
                for (m, &v) in acc.iter_mut().zip(pixel) {
                    m.push(v);
                }
            }
            acc
        })
        .collect();

    let moments = rows.into_iter().fold(vec![Moments::new(); bands], |acc, row| {
        acc.into_iter().zip(row).map(|(a, b)| a.merge(b)).collect()
    });

    Ok(moments.iter().map(Moments::finish).collect())
}
