//! Raster data-access layer.
//!
//! The engine never owns pixel storage. It talks to inputs through
//! [`RasterSource`], which reports an image's band count, extent and geometry
//! and materializes a requested [`Region`] into a [`RasterBlock`]. The block
//! offers scan-line access to pixel vectors and centered neighborhood reads.
//!
//! [`VectorImage`] is the in-memory implementation used for outputs, tests and
//! images decoded with the `image` crate.

use crate::core::error::DataAccessError;
use crate::core::pixel::PixelType;
use crate::core::region::Region;
use image::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};
use serde::{Deserialize, Serialize};

/// Physical placement of the pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageGeometry {
    /// Signed pixel spacing along x and y.
    pub spacing: (f64, f64),
    /// Physical position of the first pixel.
    pub origin: (f64, f64),
}

impl Default for ImageGeometry {
    fn default() -> Self {
        Self {
            spacing: (1.0, 1.0),
            origin: (0.0, 0.0),
        }
    }
}

/// A read-only multi-band raster the engine can request regions from.
pub trait RasterSource: Send + Sync {
    /// Number of bands in each pixel.
    fn band_count(&self) -> usize;

    /// The full extent of the available data.
    fn largest_region(&self) -> Region;

    /// Spacing and origin.
    fn geometry(&self) -> ImageGeometry;

    /// Materialize a region. Fails if the region is not inside the extent.
    fn request_region(&self, region: Region) -> Result<RasterBlock, DataAccessError>;
}

/// Pixel data for one materialized region, pixel-interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBlock {
    region: Region,
    bands: usize,
    data: Vec<f64>,
}

impl RasterBlock {
    /// Wrap an interleaved buffer covering `region`.
    pub fn new(region: Region, bands: usize, data: Vec<f64>) -> Result<Self, DataAccessError> {
        if data.len() != region.area() as usize * bands {
            return Err(DataAccessError::BufferSize {
                len: data.len(),
                width: region.width,
                height: region.height,
                bands,
            });
        }
        Ok(Self { region, bands, data })
    }

    /// The region this block covers.
    pub fn region(&self) -> Region {
        self.region
    }

    /// Number of bands per pixel.
    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Raw interleaved buffer.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    fn offset(&self, x: i64, y: i64) -> usize {
        let col = (x - self.region.x) as usize;
        let row = (y - self.region.y) as usize;
        (row * self.region.width as usize + col) * self.bands
    }

    /// The pixel vector at absolute coordinates `(x, y)`.
    ///
    /// Panics if the coordinate is outside the block; callers iterate regions
    /// that were negotiated to fit.
    pub fn pixel(&self, x: i64, y: i64) -> &[f64] {
        let start = self.offset(x, y);
        &self.data[start..start + self.bands]
    }

    /// Copy the `width x height` window of `band` centered on `(x, y)` into
    /// `out`, row-major. Coordinates outside the block repeat the nearest edge
    /// pixel.
    pub fn neighborhood(&self, band: usize, x: i64, y: i64, width: u32, height: u32, out: &mut [f64]) {
        let half_w = (width / 2) as i64;
        let half_h = (height / 2) as i64;
        let last_x = self.region.right() - 1;
        let last_y = self.region.bottom() - 1;

        let mut index = 0;
        for dy in -half_h..=half_h {
            let sy = (y + dy).clamp(self.region.y, last_y);
            for dx in -half_w..=half_w {
                let sx = (x + dx).clamp(self.region.x, last_x);
                out[index] = self.data[self.offset(sx, sy) + band];
                index += 1;
            }
        }
    }
}

/// In-memory multi-band raster with `f64` components.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorImage {
    width: u32,
    height: u32,
    bands: usize,
    data: Vec<f64>,
    geometry: ImageGeometry,
}

impl VectorImage {
    /// Create a zero-filled image.
    pub fn new(width: u32, height: u32, bands: usize) -> Self {
        Self {
            width,
            height,
            bands,
            data: vec![0.0; width as usize * height as usize * bands],
            geometry: ImageGeometry::default(),
        }
    }

    /// Build an image from `f(x, y, band)`.
    pub fn from_fn<F>(width: u32, height: u32, bands: usize, f: F) -> Self
    where
        F: Fn(u32, u32, usize) -> f64,
    {
        let mut data = Vec::with_capacity(width as usize * height as usize * bands);
        for y in 0..height {
            for x in 0..width {
                for b in 0..bands {
                    data.push(f(x, y, b));
                }
            }
        }
        Self {
            width,
            height,
            bands,
            data,
            geometry: ImageGeometry::default(),
        }
    }

    /// Wrap an interleaved buffer.
    pub fn from_vec(width: u32, height: u32, bands: usize, data: Vec<f64>) -> Result<Self, DataAccessError> {
        if data.len() != width as usize * height as usize * bands {
            return Err(DataAccessError::BufferSize {
                len: data.len(),
                width,
                height,
                bands,
            });
        }
        Ok(Self {
            width,
            height,
            bands,
            data,
            geometry: ImageGeometry::default(),
        })
    }

    /// Set the geometry.
    pub fn with_geometry(mut self, geometry: ImageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Set the spacing.
    pub fn with_spacing(mut self, x: f64, y: f64) -> Self {
        self.geometry.spacing = (x, y);
        self
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of bands.
    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Raw interleaved buffer.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Mutable raw interleaved buffer.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// The pixel vector at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[f64] {
        let start = (y as usize * self.width as usize + x as usize) * self.bands;
        &self.data[start..start + self.bands]
    }

    /// One component of a pixel.
    pub fn get(&self, x: u32, y: u32, band: usize) -> f64 {
        self.pixel(x, y)[band]
    }

    /// Decode an `image` crate image. Channels become bands, in order.
    pub fn from_dynamic_image(image: &DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let (bands, data): (usize, Vec<f64>) = match image {
            DynamicImage::ImageLuma8(b) => (1, widen(b.as_raw())),
            DynamicImage::ImageLumaA8(b) => (2, widen(b.as_raw())),
            DynamicImage::ImageRgb8(b) => (3, widen(b.as_raw())),
            DynamicImage::ImageRgba8(b) => (4, widen(b.as_raw())),
            DynamicImage::ImageLuma16(b) => (1, widen(b.as_raw())),
            DynamicImage::ImageLumaA16(b) => (2, widen(b.as_raw())),
            DynamicImage::ImageRgb16(b) => (3, widen(b.as_raw())),
            DynamicImage::ImageRgba16(b) => (4, widen(b.as_raw())),
            DynamicImage::ImageRgb32F(b) => (3, widen(b.as_raw())),
            DynamicImage::ImageRgba32F(b) => (4, widen(b.as_raw())),
            other => (4, widen(other.to_rgba32f().as_raw())),
        };
        Self {
            width,
            height,
            bands,
            data,
            geometry: ImageGeometry::default(),
        }
    }

    /// Encode as an `image` crate image.
    ///
    /// 8- and 16-bit unsigned outputs support 1 to 4 bands; `f32` outputs
    /// support 3 or 4 bands.
    pub fn to_dynamic_image(&self, pixel_type: PixelType) -> Result<DynamicImage, DataAccessError> {
        let (w, h) = (self.width, self.height);
        let unsupported = || DataAccessError::UnsupportedEncoding {
            bands: self.bands,
            pixel_type: pixel_type.to_string(),
        };

        let image = match (pixel_type, self.bands) {
            (PixelType::U8, 1) => ImageBuffer::<Luma<u8>, _>::from_raw(w, h, narrow(&self.data)).map(DynamicImage::ImageLuma8),
            (PixelType::U8, 2) => ImageBuffer::<LumaA<u8>, _>::from_raw(w, h, narrow(&self.data)).map(DynamicImage::ImageLumaA8),
            (PixelType::U8, 3) => ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, narrow(&self.data)).map(DynamicImage::ImageRgb8),
            (PixelType::U8, 4) => ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, narrow(&self.data)).map(DynamicImage::ImageRgba8),
            (PixelType::U16, 1) => ImageBuffer::<Luma<u16>, _>::from_raw(w, h, narrow(&self.data)).map(DynamicImage::ImageLuma16),
            (PixelType::U16, 2) => ImageBuffer::<LumaA<u16>, _>::from_raw(w, h, narrow(&self.data)).map(DynamicImage::ImageLumaA16),
            (PixelType::U16, 3) => ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, narrow(&self.data)).map(DynamicImage::ImageRgb16),
            (PixelType::U16, 4) => ImageBuffer::<Rgba<u16>, _>::from_raw(w, h, narrow(&self.data)).map(DynamicImage::ImageRgba16),
            (PixelType::F32, 3) => ImageBuffer::<Rgb<f32>, _>::from_raw(w, h, narrow(&self.data)).map(DynamicImage::ImageRgb32F),
            (PixelType::F32, 4) => ImageBuffer::<Rgba<f32>, _>::from_raw(w, h, narrow(&self.data)).map(DynamicImage::ImageRgba32F),
            _ => None,
        };

        image.ok_or_else(unsupported)
    }
}

fn widen<T: Copy + Into<f64>>(raw: &[T]) -> Vec<f64> {
    raw.iter().map(|&v| v.into()).collect()
}

fn narrow<T: FromF64>(data: &[f64]) -> Vec<T> {
    data.iter().map(|&v| T::from_f64(v)).collect()
}

trait FromF64 {
    fn from_f64(v: f64) -> Self;
}

impl FromF64 for u8 {
    fn from_f64(v: f64) -> Self {
        v as u8
    }
}

impl FromF64 for u16 {
    fn from_f64(v: f64) -> Self {
        v as u16
    }
}

impl FromF64 for f32 {
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl RasterSource for VectorImage {
    fn band_count(&self) -> usize {
        self.bands
    }

    fn largest_region(&self) -> Region {
        Region::from_size(self.width, self.height)
    }

    fn geometry(&self) -> ImageGeometry {
        self.geometry
    }

    fn request_region(&self, region: Region) -> Result<RasterBlock, DataAccessError> {
        let available = self.largest_region();
        if !available.contains_region(&region) {
            return Err(DataAccessError::RegionUnavailable {
                requested: region,
                available,
            });
        }

        let row_len = region.width as usize * self.bands;
        let mut data = Vec::with_capacity(region.area() as usize * self.bands);
        for y in region.y..region.bottom() {
            let start = (y as usize * self.width as usize + region.x as usize) * self.bands;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        RasterBlock::new(region, self.bands, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> VectorImage {
        // band 0 = x + 10 * y, band 1 = -(x + 10 * y)
        VectorImage::from_fn(5, 4, 2, |x, y, b| {
            let v = (x + 10 * y) as f64;
            if b == 0 { v } else { -v }
        })
    }

    #[test]
    fn test_request_region() {
        let image = ramp();
        let block = image.request_region(Region::new(1, 1, 3, 2)).unwrap();
        assert_eq!(block.pixel(1, 1), &[11.0, -11.0]);
        assert_eq!(block.pixel(3, 2), &[23.0, -23.0]);
        assert_eq!(block.data().len(), 3 * 2 * 2);
    }

    #[test]
    fn test_request_region_outside() {
        let image = ramp();
        let err = image.request_region(Region::new(-1, 0, 3, 2)).unwrap_err();
        assert!(matches!(err, DataAccessError::RegionUnavailable { .. }));
    }

    #[test]
    fn test_neighborhood_interior() {
        let image = ramp();
        let block = image.request_region(image.largest_region()).unwrap();
        let mut out = vec![0.0; 3 * 3];
        block.neighborhood(0, 2, 1, 3, 3, &mut out);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 11.0, 12.0, 13.0, 21.0, 22.0, 23.0]);
    }

    #[test]
    fn test_neighborhood_replicates_edges() {
        let image = ramp();
        let block = image.request_region(image.largest_region()).unwrap();
        let mut out = vec![0.0; 3];
        block.neighborhood(1, 0, 0, 3, 1, &mut out);
        assert_eq!(out, vec![-0.0, -0.0, -1.0]);
    }

    #[test]
    fn test_from_vec_checks_size() {
        assert!(VectorImage::from_vec(2, 2, 1, vec![0.0; 3]).is_err());
    }

    #[test]
    fn test_dynamic_image_round_trip() {
        let image = VectorImage::from_fn(3, 2, 3, |x, y, b| (x + y + b as u32) as f64);
        let encoded = image.to_dynamic_image(PixelType::U8).unwrap();
        let decoded = VectorImage::from_dynamic_image(&encoded);
        assert_eq!(decoded.bands(), 3);
        assert_eq!(decoded.data(), image.data());

        assert!(image.to_dynamic_image(PixelType::I16).is_err());
    }
}
