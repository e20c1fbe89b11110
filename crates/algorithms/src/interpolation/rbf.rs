//! Radial Basis Function (RBF) interpolation
//!
//! Builds a surface that passes through every sample:
//! ```text
//! f(x,y) = Σᵢ wᵢ · φ(‖(x,y) - (xᵢ,yᵢ)‖)
//! ```
//! with weights from the n×n system `Φ·w = z`, `Φᵢⱼ = φ(‖xᵢ - xⱼ‖)`.
//! A positive `smoothing` adds λ to the diagonal and relaxes exactness.
//!
//! The shape parameter ε of the scaled kernels defaults to the mean node
//! spacing `(Π non-zero edges / n)^(1/dims)` of the sample bounding box.
//!
//! Reference:
//! Hardy, R.L. (1971). Multiquadric equations of topography and other
//! irregular surfaces. J. Geophys. Res.

use crate::linalg::LuDecomposition;
use crate::maybe_rayon::*;
use cheaqi_core::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{merge_coincident, Grid, SamplePoint};

/// Radial kernel φ(r)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RbfFunction {
    /// √((r/ε)² + 1)
    #[default]
    Multiquadric,
    /// 1 / √((r/ε)² + 1)
    InverseMultiquadric,
    /// exp(-(r/ε)²)
    Gaussian,
    /// r
    Linear,
    /// r³
    Cubic,
    /// r²·ln(r), with φ(0) = 0
    ThinPlate,
}

impl RbfFunction {
    #[inline]
    pub fn evaluate(&self, r: f64, epsilon: f64) -> f64 {
        match self {
            RbfFunction::Multiquadric => ((r / epsilon).powi(2) + 1.0).sqrt(),
            RbfFunction::InverseMultiquadric => 1.0 / ((r / epsilon).powi(2) + 1.0).sqrt(),
            RbfFunction::Gaussian => (-(r / epsilon).powi(2)).exp(),
            RbfFunction::Linear => r,
            RbfFunction::Cubic => r * r * r,
            RbfFunction::ThinPlate => {
                if r < 1e-15 {
                    0.0
                } else {
                    r * r * r.ln()
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RbfFunction::Multiquadric => "multiquadric",
            RbfFunction::InverseMultiquadric => "inverse_multiquadric",
            RbfFunction::Gaussian => "gaussian",
            RbfFunction::Linear => "linear",
            RbfFunction::Cubic => "cubic",
            RbfFunction::ThinPlate => "thin_plate",
        }
    }
}

impl fmt::Display for RbfFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RbfFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "multiquadric" => Ok(RbfFunction::Multiquadric),
            "inverse_multiquadric" | "inverse" => Ok(RbfFunction::InverseMultiquadric),
            "gaussian" => Ok(RbfFunction::Gaussian),
            "linear" => Ok(RbfFunction::Linear),
            "cubic" => Ok(RbfFunction::Cubic),
            "thin_plate" => Ok(RbfFunction::ThinPlate),
            _ => Err(Error::InvalidParameter {
                name: "rbf_function",
                value: s.to_string(),
                reason: "expected multiquadric, inverse_multiquadric, gaussian, linear, cubic or thin_plate".into(),
            }),
        }
    }
}

/// Parameters for RBF interpolation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RbfParams {
    pub function: RbfFunction,
    /// Shape parameter ε; `None` uses the mean node spacing
    pub epsilon: Option<f64>,
    /// Smoothing λ ≥ 0 added to the diagonal. 0 = exact interpolation.
    pub smoothing: f64,
}

/// Mean node spacing of the sample bounding box
fn default_epsilon(points: &[SamplePoint]) -> f64 {
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }

    let edges: Vec<f64> = [max_x - min_x, max_y - min_y]
        .into_iter()
        .filter(|e| *e > 0.0)
        .collect();
    if edges.is_empty() {
        return 1.0;
    }
    let product: f64 = edges.iter().product();
    (product / points.len() as f64).powf(1.0 / edges.len() as f64)
}

/// RBF interpolation from scattered points onto `grid`.
///
/// Samples sharing coordinates are merged (mean value) first, otherwise the
/// system would have identical rows.
///
/// # Errors
/// - [`Error::InsufficientData`] with no samples
/// - [`Error::InvalidParameter`] for a non-positive ε or negative λ
/// - [`Error::Algorithm`] if the system is singular
pub fn rbf_interpolation(points: &[SamplePoint], grid: &Grid, params: &RbfParams) -> Result<Array2<f64>> {
    if points.is_empty() {
        return Err(Error::InsufficientData {
            required: 1,
            found: 0,
        });
    }
    if !(params.smoothing.is_finite() && params.smoothing >= 0.0) {
        return Err(Error::InvalidParameter {
            name: "rbf_smoothing",
            value: params.smoothing.to_string(),
            reason: "must be a non-negative number".into(),
        });
    }

    let points = merge_coincident(points);
    let epsilon = params.epsilon.unwrap_or_else(|| default_epsilon(&points));
    if !(epsilon.is_finite() && epsilon > 0.0) {
        return Err(Error::InvalidParameter {
            name: "rbf_epsilon",
            value: epsilon.to_string(),
            reason: "must be a positive number".into(),
        });
    }

    let function = params.function;
    let n = points.len();
    let mut mat = vec![0.0_f64; n * n];
    for i in 0..n {
        for j in 0..n {
            let r = points[i].dist(points[j].x, points[j].y);
            mat[i * n + j] = function.evaluate(r, epsilon);
        }
        mat[i * n + i] += params.smoothing;
    }

    let rhs: Vec<f64> = points.iter().map(|p| p.value).collect();
    let weights = LuDecomposition::factor(n, mat)
        .map_err(|e| Error::Algorithm(format!("RBF system ({}): {}", function, e)))?
        .solve(&rhs);

    let (rows, cols) = grid.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let (x, y) = grid.node(row, col);
                    points
                        .iter()
                        .zip(&weights)
                        .map(|(pt, w)| w * function.evaluate(pt.dist(x, y), epsilon))
                        .sum::<f64>()
                })
                .collect::<Vec<f64>>()
        })
        .collect();

    Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_grid() -> Grid {
        let axis: Vec<f64> = (0..=10).map(|i| i as f64).collect();
        Grid::new(axis.clone(), axis).unwrap()
    }

    fn scattered() -> Vec<SamplePoint> {
        vec![
            SamplePoint::new(1.0, 1.0, 3.0),
            SamplePoint::new(9.0, 2.0, 8.0),
            SamplePoint::new(4.0, 6.0, 5.0),
            SamplePoint::new(7.0, 9.0, 1.0),
            SamplePoint::new(2.0, 8.0, 6.0),
        ]
    }

    #[test]
    fn test_multiquadric_passes_through_samples() {
        let result = rbf_interpolation(&scattered(), &unit_grid(), &RbfParams::default()).unwrap();

        // (x=4, y=6) is row 4, col 4; (x=9, y=2) is row 8, col 9
        assert_relative_eq!(result[(4, 4)], 5.0, epsilon = 1e-8);
        assert_relative_eq!(result[(8, 9)], 8.0, epsilon = 1e-8);
        assert!(result.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_every_kernel_interpolates() {
        for function in [
            RbfFunction::InverseMultiquadric,
            RbfFunction::Gaussian,
            RbfFunction::Linear,
            RbfFunction::Cubic,
            RbfFunction::ThinPlate,
        ] {
            let params = RbfParams {
                function,
                ..Default::default()
            };
            let result = rbf_interpolation(&scattered(), &unit_grid(), &params).unwrap();
            assert_relative_eq!(result[(9, 1)], 3.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_default_epsilon_is_mean_spacing() {
        // Box 8 × 8 with 4 points: sqrt(64 / 4) = 4
        let points = vec![
            SamplePoint::new(0.0, 0.0, 1.0),
            SamplePoint::new(8.0, 0.0, 1.0),
            SamplePoint::new(0.0, 8.0, 1.0),
            SamplePoint::new(8.0, 8.0, 1.0),
        ];
        assert_relative_eq!(default_epsilon(&points), 4.0, epsilon = 1e-12);

        // A zero-width axis is dropped: (10 / 2)^1
        let line = vec![SamplePoint::new(0.0, 3.0, 1.0), SamplePoint::new(10.0, 3.0, 2.0)];
        assert_relative_eq!(default_epsilon(&line), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_smoothing_relaxes_fit() {
        let params = RbfParams {
            smoothing: 10.0,
            ..Default::default()
        };
        let result = rbf_interpolation(&scattered(), &unit_grid(), &params).unwrap();
        assert!((result[(4, 4)] - 5.0).abs() > 1e-6);
    }

    #[test]
    fn test_function_names() {
        assert_eq!("thin-plate".parse::<RbfFunction>().unwrap(), RbfFunction::ThinPlate);
        assert_eq!(RbfFunction::default().to_string(), "multiquadric");
        assert!("quintic".parse::<RbfFunction>().is_err());
    }

    #[test]
    fn test_rejects_bad_epsilon() {
        let params = RbfParams {
            epsilon: Some(0.0),
            ..Default::default()
        };
        assert!(rbf_interpolation(&scattered(), &unit_grid(), &params).is_err());
    }
}
