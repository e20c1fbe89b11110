//! Error types for CHEAQI core operations

use thiserror::Error;

/// Main error type for raster, georeferencing and interpolation operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch in band {band}: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch {
        band: usize,
        er: usize,
        ec: usize,
        ar: usize,
        ac: usize,
    },

    #[error("Geotransform mismatch in band {band}: expected {expected:?}, got {actual:?}")]
    TransformMismatch {
        band: usize,
        expected: [f64; 6],
        actual: [f64; 6],
    },

    #[error("CRS mismatch in band {band}: {expected} vs {actual}")]
    CrsMismatch {
        band: usize,
        expected: String,
        actual: String,
    },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Insufficient data: need at least {required} points, got {found}")]
    InsufficientData { required: usize, found: usize },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("TIFF error: {0}")]
    Tiff(String),

    #[error("{0}")]
    Other(String),
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        Error::Tiff(e.to_string())
    }
}

/// Result type alias for CHEAQI core operations
pub type Result<T> = std::result::Result<T, Error>;
