//! Rectangular pixel regions and neighborhood halos.
//!
//! A [`Region`] is an origin plus a size on a raster's pixel grid. Origins are
//! signed so that a region padded by a [`Halo`] can temporarily extend past the
//! top-left corner of an image before it is cropped back to the available data.
//!
//! # Example
//!
//! ```
//! use bandmath::core::region::{pad_and_crop, Halo, Region};
//!
//! let image = Region::from_size(100, 100);
//! let tile = Region::new(0, 10, 50, 20);
//! let padded = pad_and_crop(&tile, Halo::new(2, 1), &image).unwrap();
//! assert_eq!(padded, Region::new(0, 9, 52, 22));
//! ```

use crate::core::error::RegionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a rectangular region of a pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// X offset of the first column
    pub x: i64,
    /// Y offset of the first row
    pub y: i64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Region {
    /// Create a new region.
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Create a region anchored at the origin.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Get the right edge coordinate (exclusive).
    pub fn right(&self) -> i64 {
        self.x + self.width as i64
    }

    /// Get the bottom edge coordinate (exclusive).
    pub fn bottom(&self) -> i64 {
        self.y + self.height as i64
    }

    /// Calculate the area of this region in pixels.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether the region covers no pixel.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Check whether a pixel coordinate lies inside the region.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Check whether `other` lies entirely inside this region.
    pub fn contains_region(&self, other: &Region) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Grow the region symmetrically by a halo. No clamping is applied.
    pub fn pad(&self, halo: Halo) -> Self {
        Self {
            x: self.x - halo.x as i64,
            y: self.y - halo.y as i64,
            width: self.width + 2 * halo.x,
            height: self.height + 2 * halo.y,
        }
    }

    /// Intersect with `bounds`. Returns `None` when the overlap is empty.
    pub fn crop(&self, bounds: &Region) -> Option<Self> {
        let x = self.x.max(bounds.x);
        let y = self.y.max(bounds.y);
        let right = self.right().min(bounds.right());
        let bottom = self.bottom().min(bounds.bottom());

        if right <= x || bottom <= y {
            return None;
        }

        Some(Self {
            x,
            y,
            width: (right - x) as u32,
            height: (bottom - y) as u32,
        })
    }

    /// Number of rows each part gets when the region is split into at most
    /// `parts` contiguous row ranges. The last range may be shorter.
    pub fn row_chunk_height(&self, parts: usize) -> u32 {
        let parts = parts.max(1) as u32;
        if self.height == 0 {
            return 0;
        }
        let parts = parts.min(self.height);
        (self.height + parts - 1) / parts
    }

    /// Split the region into contiguous, disjoint row ranges.
    pub fn split_rows(&self, parts: usize) -> Vec<Region> {
        let chunk = self.row_chunk_height(parts);
        if chunk == 0 || self.width == 0 {
            return Vec::new();
        }

        let mut ranges = Vec::new();
        let mut offset = 0;
        while offset < self.height {
            let height = chunk.min(self.height - offset);
            ranges.push(Region::new(self.x, self.y + offset as i64, self.width, height));
            offset += height;
        }
        ranges
    }

    /// Iterate over horizontal strips of at most `lines` rows.
    /// A `lines` value of zero yields the whole region as one strip.
    pub fn strips(&self, lines: u32) -> StripIterator {
        StripIterator {
            region: *self,
            lines: if lines == 0 { self.height.max(1) } else { lines },
            offset: 0,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}; {}x{}]", self.x, self.y, self.width, self.height)
    }
}

/// Iterator over horizontal strips of a region, top to bottom.
#[derive(Debug, Clone)]
pub struct StripIterator {
    region: Region,
    lines: u32,
    offset: u32,
}

impl StripIterator {
    /// Get the total number of strips.
    pub fn strip_count(&self) -> usize {
        if self.region.is_empty() {
            return 0;
        }
        ((self.region.height + self.lines - 1) / self.lines) as usize
    }
}

impl Iterator for StripIterator {
    type Item = Region;

    fn next(&mut self) -> Option<Self::Item> {
        if self.region.is_empty() || self.offset >= self.region.height {
            return None;
        }

        let height = self.lines.min(self.region.height - self.offset);
        let strip = Region::new(
            self.region.x,
            self.region.y + self.offset as i64,
            self.region.width,
            height,
        );
        self.offset += height;
        Some(strip)
    }
}

/// Half extents of a centered neighborhood window.
///
/// A `w x h` window (both odd) has a halo of `((w - 1) / 2, (h - 1) / 2)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Halo {
    /// Columns needed on each side.
    pub x: u32,
    /// Rows needed on each side.
    pub y: u32,
}

impl Halo {
    /// Create a halo from half extents.
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Size of the window this halo surrounds.
    pub fn window(&self) -> (u32, u32) {
        (2 * self.x + 1, 2 * self.y + 1)
    }

    /// Combine with another halo (take maximum of each).
    pub fn combine(&self, other: &Halo) -> Halo {
        Halo {
            x: self.x.max(other.x),
            y: self.y.max(other.y),
        }
    }
}

/// Pad `region` by `halo` and crop the result to `bounds`.
///
/// Fails when the padded region does not overlap `bounds` at all, or when the
/// window described by `halo` is larger than `bounds` in either axis, since no
/// pixel of the data could then be read with its full neighborhood.
pub fn pad_and_crop(region: &Region, halo: Halo, bounds: &Region) -> Result<Region, RegionError> {
    let padded = region.pad(halo);
    let (window_x, window_y) = halo.window();

    let outside = || RegionError::OutsideAvailableExtent {
        requested: padded,
        available: *bounds,
        window: (window_x, window_y),
    };

    if window_x > bounds.width || window_y > bounds.height {
        return Err(outside());
    }

    padded.crop(bounds).ok_or_else(outside)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_edges() {
        let region = Region::new(10, 20, 100, 200);
        assert_eq!(region.right(), 110);
        assert_eq!(region.bottom(), 220);
        assert_eq!(region.area(), 20000);
        assert!(region.contains(10, 20));
        assert!(!region.contains(110, 20));
    }

    #[test]
    fn test_pad_goes_negative() {
        let padded = Region::new(0, 0, 4, 4).pad(Halo::new(2, 1));
        assert_eq!(padded, Region::new(-2, -1, 8, 6));
    }

    #[test]
    fn test_crop_no_overlap() {
        let bounds = Region::from_size(10, 10);
        assert!(Region::new(10, 0, 5, 5).crop(&bounds).is_none());
        assert_eq!(
            Region::new(-3, 8, 5, 5).crop(&bounds),
            Some(Region::new(0, 8, 2, 2))
        );
    }

    #[test]
    fn test_pad_and_crop_at_boundary() {
        let bounds = Region::from_size(200, 200);
        let cropped = pad_and_crop(&Region::new(0, 0, 100, 100), Halo::new(10, 10), &bounds).unwrap();
        assert_eq!(cropped, Region::new(0, 0, 110, 110));
    }

    #[test]
    fn test_pad_and_crop_window_larger_than_extent() {
        let bounds = Region::from_size(3, 3);
        let err = pad_and_crop(&bounds, Halo::new(2, 2), &bounds).unwrap_err();
        assert!(matches!(err, RegionError::OutsideAvailableExtent { window: (5, 5), .. }));
    }

    #[test]
    fn test_pad_and_crop_disjoint() {
        let bounds = Region::from_size(8, 8);
        let err = pad_and_crop(&Region::new(20, 20, 2, 2), Halo::new(1, 1), &bounds);
        assert!(err.is_err());
    }

    #[test]
    fn test_halo_window() {
        assert_eq!(Halo::new(2, 1).window(), (5, 3));
        assert_eq!(Halo::new(0, 3).combine(&Halo::new(1, 1)), Halo::new(1, 3));
    }

    #[test]
    fn test_split_rows() {
        let region = Region::new(0, 5, 7, 10);
        let parts = region.split_rows(4);
        assert_eq!(region.row_chunk_height(4), 3);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], Region::new(0, 5, 7, 3));
        assert_eq!(parts[3], Region::new(0, 14, 7, 1));
        assert_eq!(parts.iter().map(|r| r.area()).sum::<u64>(), region.area());

        // More threads than rows
        assert_eq!(Region::from_size(3, 2).split_rows(8).len(), 2);
    }

    #[test]
    fn test_strips() {
        let iter = Region::from_size(10, 25).strips(10);
        assert_eq!(iter.strip_count(), 3);
        let strips: Vec<_> = iter.collect();
        assert_eq!(strips[2], Region::new(0, 20, 10, 5));

        let whole: Vec<_> = Region::from_size(4, 4).strips(0).collect();
        assert_eq!(whole, vec![Region::from_size(4, 4)]);
    }
}
