//! GeoTIFF reading and writing
//!
//! - [`write_geotiff`] / [`read_geotiff`]: single-band Float32 rasters through
//!   the `tiff` crate, with GeoKeys, band description and NaN nodata.
//! - [`write_multiband_geotiff`] / [`read_multiband_geotiff`] / [`read_band`]:
//!   band-sequential (planar) multi-band files for geostacks, written in one
//!   shot after every band profile has been checked.
//!
//! All writers go through a temporary file in the destination directory and
//! rename on success, so readers never observe a partially written raster.

mod atomic;
mod gdal_metadata;
mod geokeys;
mod multiband;
mod native;

pub use atomic::write_atomic;
pub use multiband::{
    check_band_profiles, read_band, read_multiband_geotiff, write_multiband_geotiff,
};
pub use native::{read_geotiff, write_geotiff, GeoTiffOptions};

/// TIFF tag numbers used by the GeoTIFF and GDAL conventions.
pub(crate) mod tags {
    pub const MODEL_PIXEL_SCALE: u16 = 33550;
    pub const MODEL_TIEPOINT: u16 = 33922;
    pub const GEO_KEY_DIRECTORY: u16 = 34735;
    pub const GEO_ASCII_PARAMS: u16 = 34737;
    pub const GDAL_METADATA: u16 = 42112;
    pub const GDAL_NODATA: u16 = 42113;
}
