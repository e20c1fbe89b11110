//! Spatial interpolation of scattered samples onto regular grids
//!
//! - Grid: buffered, capped query lattice over the sample extent
//! - Variogram: empirical semivariance and model fitting
//! - Ordinary Kriging: global BLUE estimate with estimation variance
//! - IDW: global inverse distance weighting
//! - RBF: radial basis function surface through every sample
//!
//! [`interpolate`] dispatches on the closed [`InterpolationMethod`] enum and
//! always returns arrays in raster order (row 0 is the northern-most row).

mod grid;
mod idw;
pub mod kriging;
mod method;
mod rbf;
pub mod variogram;

pub use grid::{build_grid, Grid, GridSpec, Resolution};
pub use idw::{idw, IdwParams};
pub use kriging::{ordinary_kriging, KrigingParams};
pub use method::{interpolate, InterpolationMethod, MethodKind, Surface};
pub use rbf::{rbf_interpolation, RbfFunction, RbfParams};
pub use variogram::{
    empirical_variogram, fit_variogram, EmpiricalVariogram, FittedVariogram, VariogramModel,
};

use std::collections::HashMap;

/// A sample point with x, y coordinates and a value.
///
/// For geographic data `x` is longitude and `y` latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

impl SamplePoint {
    pub fn new(x: f64, y: f64, value: f64) -> Self {
        Self { x, y, value }
    }

    /// Squared Euclidean distance to another point
    #[inline]
    pub fn dist_sq(&self, other_x: f64, other_y: f64) -> f64 {
        let dx = self.x - other_x;
        let dy = self.y - other_y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to another point
    #[inline]
    pub fn dist(&self, other_x: f64, other_y: f64) -> f64 {
        self.dist_sq(other_x, other_y).sqrt()
    }
}

/// Collapse samples sharing identical coordinates into one point carrying
/// the mean value. First-appearance order is kept.
pub(crate) fn merge_coincident(points: &[SamplePoint]) -> Vec<SamplePoint> {
    // +0.0 folds -0.0 onto the same key
    let key = |p: &SamplePoint| ((p.x + 0.0).to_bits(), (p.y + 0.0).to_bits());

    let mut index: HashMap<(u64, u64), usize> = HashMap::with_capacity(points.len());
    let mut merged: Vec<(SamplePoint, usize)> = Vec::with_capacity(points.len());
    for p in points {
        match index.get(&key(p)) {
            Some(&i) => {
                merged[i].0.value += p.value;
                merged[i].1 += 1;
            }
            None => {
                index.insert(key(p), merged.len());
                merged.push((*p, 1));
            }
        }
    }

    merged
        .into_iter()
        .map(|(mut p, count)| {
            p.value /= count as f64;
            p
        })
        .collect()
}

/// Whether every sample carries the same value
pub(crate) fn is_constant(points: &[SamplePoint]) -> bool {
    match points.first() {
        Some(first) => points.iter().all(|p| p.value == first.value),
        None => false,
    }
}
