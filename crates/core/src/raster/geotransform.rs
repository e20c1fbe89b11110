//! Affine geotransformation for north-up rasters

use serde::{Deserialize, Serialize};

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and map coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// Rasters produced by the pipeline are always north-up: pixel (0, 0) is the
/// top-left corner of the buffered bounding box and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, negative for north-up)
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a new north-up GeoTransform
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Build the transform that maps a `width` x `height` raster onto the
    /// bounds `(min_x, min_y, max_x, max_y)`, top-left pixel at `(min_x, max_y)`.
    pub fn from_bounds(
        bounds: (f64, f64, f64, f64),
        width: usize,
        height: usize,
    ) -> Self {
        let (min_x, min_y, max_x, max_y) = bounds;
        let pixel_width = (max_x - min_x) / width.max(1) as f64;
        let pixel_height = -(max_y - min_y) / height.max(1) as f64;
        Self::new(min_x, max_y, pixel_width, pixel_height)
    }

    /// GDAL-style coefficient array
    /// `[origin_x, pixel_width, 0, origin_y, 0, pixel_height]`
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }

    /// Map coordinates of the pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.origin_x + (col as f64 + 0.5) * self.pixel_width;
        let y = self.origin_y + (row as f64 + 0.5) * self.pixel_height;
        (x, y)
    }

    /// Fractional pixel coordinates of a map location; NaN for degenerate transforms
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        if self.pixel_width.abs() < 1e-300 || self.pixel_height.abs() < 1e-300 {
            return (f64::NAN, f64::NAN);
        }
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Check if this is a north-up image
    pub fn is_north_up(&self) -> bool {
        self.pixel_width > 0.0 && self.pixel_height < 0.0
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)` of a raster with the given size
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let x0 = self.origin_x;
        let x1 = self.origin_x + width as f64 * self.pixel_width;
        let y0 = self.origin_y;
        let y1 = self.origin_y + height as f64 * self.pixel_height;
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Coefficient-wise comparison with a tolerance relative to the pixel size
    pub fn approx_eq(&self, other: &GeoTransform) -> bool {
        let scale = self
            .pixel_width
            .abs()
            .max(self.pixel_height.abs())
            .max(f64::MIN_POSITIVE);
        let tol = scale * 1e-6;
        self.to_gdal()
            .iter()
            .zip(other.to_gdal().iter())
            .all(|(a, b)| (a - b).abs() <= tol)
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_roundtrip() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);

        let (x, y) = gt.pixel_to_geo(5, 10);
        let (col, row) = gt.geo_to_pixel(x, y);

        assert_relative_eq!(col, 5.5, epsilon = 1e-10);
        assert_relative_eq!(row, 10.5, epsilon = 1e-10);
    }

    #[test]
    fn test_from_bounds_is_north_up() {
        let gt = GeoTransform::from_bounds((29.0, -1.5, 35.0, 4.5), 60, 120);

        assert!(gt.is_north_up());
        assert_relative_eq!(gt.origin_x, 29.0);
        assert_relative_eq!(gt.origin_y, 4.5);
        assert_relative_eq!(gt.pixel_width, 0.1, epsilon = 1e-12);
        assert_relative_eq!(gt.pixel_height, -0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_bounds_roundtrip() {
        let bounds = (0.0, 0.0, 100.0, 50.0);
        let gt = GeoTransform::from_bounds(bounds, 100, 100);
        let (min_x, min_y, max_x, max_y) = gt.bounds(100, 100);

        assert_relative_eq!(min_x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(min_y, 0.0, epsilon = 1e-10);
        assert_relative_eq!(max_x, 100.0, epsilon = 1e-10);
        assert_relative_eq!(max_y, 50.0, epsilon = 1e-10);
    }

    #[test]
    fn test_approx_eq_tolerates_rounding() {
        let a = GeoTransform::new(30.0, 2.0, 0.01, -0.01);
        let b = GeoTransform::new(30.0 + 1e-12, 2.0, 0.01, -0.01);
        let c = GeoTransform::new(30.5, 2.0, 0.01, -0.01);
        assert!(a.approx_eq(&b));
        assert!(!a.approx_eq(&c));
    }
}
