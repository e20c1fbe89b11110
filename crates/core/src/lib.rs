//! # CHEAQI Core
//!
//! Core raster types and GeoTIFF I/O for the CHEAQI interpolation pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced 2D grid with an optional band description
//! - `GeoTransform`: affine transformation for north-up rasters
//! - `CRS`: explicit coordinate reference system (EPSG:4326 by default)
//! - Single-band GeoTIFF encoding/decoding and a multi-band planar codec

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
}
