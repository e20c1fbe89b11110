//! Raster element trait for floating point cell values

use num_traits::{Float, NumCast};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Interpolated surfaces are always real-valued and use NaN as the
/// no-data marker, so only floating point types implement this trait.
pub trait RasterElement: Float + Debug + Send + Sync + 'static {
    /// Number of bits per sample when encoded in a TIFF
    const BITS: u16;

    /// No-data marker for this type
    fn nodata() -> Self {
        Self::nan()
    }

    /// Convert from `f64`, mapping unrepresentable values to NaN
    fn from_f64(v: f64) -> Self {
        <Self as NumCast>::from(v).unwrap_or_else(Self::nan)
    }

    /// Convert self to f64
    fn to_f64_lossless(self) -> f64 {
        <f64 as NumCast>::from(self).unwrap_or(f64::NAN)
    }
}

impl RasterElement for f32 {
    const BITS: u16 = 32;
}

impl RasterElement for f64 {
    const BITS: u16 = 64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_survives_conversion() {
        assert!(<f32 as RasterElement>::from_f64(f64::NAN).is_nan());
        assert!(f32::nan().to_f64_lossless().is_nan());
    }

    #[test]
    fn test_from_f64_narrows() {
        let v = <f32 as RasterElement>::from_f64(1.5);
        assert_eq!(v, 1.5_f32);
    }
}
