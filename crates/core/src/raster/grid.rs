//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::{Array2, ArrayView2};

/// A georeferenced single-band 2D raster.
///
/// Values are stored in row-major order with row 0 at the northern edge.
/// The optional `description` is the per-band label persisted with the
/// file (for pipeline outputs: `"<variable> - <date>"`).
///
/// # Example
///
/// ```ignore
/// use cheaqi_core::Raster;
///
/// let mut raster: Raster<f32> = Raster::filled(100, 100, f32::NAN);
/// raster.set(10, 20, 42.0)?;
/// raster.set_description(Some("pm25 - 2024-03-01".into()));
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    data: Array2<T>,
    transform: GeoTransform,
    crs: Option<CRS>,
    description: Option<String>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            description: None,
        }
    }

    /// Convert every cell to another element type, keeping the metadata
    pub fn cast<U: RasterElement>(&self) -> Raster<U> {
        Raster {
            data: self.data.mapv(|v| U::from_f64(v.to_f64_lossless())),
            transform: self.transform,
            crs: self.crs.clone(),
            description: self.description.clone(),
        }
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Consume the raster and return the underlying array
    pub fn into_array(self) -> Array2<T> {
        self.data
    }

    /// Row-major copy of the cell values
    pub fn to_row_major(&self) -> Vec<T> {
        self.data.iter().copied().collect()
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Band description
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Set the band description
    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Pixel center of (col, row) in map coordinates
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    // Statistics

    /// Basic statistics over the non-NaN cells
    pub fn statistics(&self) -> RasterStatistics {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            let v = value.to_f64_lossless();
            if v.is_nan() {
                continue;
            }
            min = min.min(v);
            max = max.max(v);
            sum += v;
            count += 1;
        }

        if count == 0 {
            return RasterStatistics {
                min: None,
                max: None,
                mean: None,
                valid_count: 0,
                nodata_count: self.len(),
            };
        }

        RasterStatistics {
            min: Some(min),
            max: Some(max),
            mean: Some(sum / count as f64),
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f32> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
    }

    #[test]
    fn test_raster_access() {
        let mut raster: Raster<f32> = Raster::new(10, 10);
        raster.set(5, 5, 42.0).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 42.0);
        assert!(raster.get(10, 0).is_err());
    }

    #[test]
    fn test_statistics_skip_nan() {
        let mut raster: Raster<f64> = Raster::filled(4, 4, f64::NAN);
        raster.set(0, 0, 1.0).unwrap();
        raster.set(3, 3, 5.0).unwrap();

        let stats = raster.statistics();
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(5.0));
        assert_eq!(stats.mean, Some(3.0));
        assert_eq!(stats.valid_count, 2);
        assert_eq!(stats.nodata_count, 14);
    }

    #[test]
    fn test_cast_keeps_metadata() {
        let mut raster: Raster<f64> = Raster::filled(2, 3, 1.25);
        raster.set_description(Some("no2 - 2024-01-02".into()));
        raster.set_crs(Some(CRS::wgs84()));
        raster.set(1, 2, f64::NAN).unwrap();

        let narrowed: Raster<f32> = raster.cast();
        assert_eq!(narrowed.description(), Some("no2 - 2024-01-02"));
        assert_eq!(narrowed.crs(), Some(&CRS::wgs84()));
        assert_eq!(narrowed.get(0, 0).unwrap(), 1.25_f32);
        assert!(narrowed.get(1, 2).unwrap().is_nan());
    }
}
