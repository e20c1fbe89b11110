//! Ordinary Kriging interpolation
//!
//! Best Linear Unbiased Estimator (BLUE) for spatial data. Uses a fitted
//! variogram model to compute optimal interpolation weights that minimize
//! estimation variance while satisfying an unbiasedness constraint.
//!
//! The kriging system for n sample points:
//! ```text
//! [γ(x₁,x₁) ... γ(x₁,xₙ) 1] [w₁]   [γ(x₁,x₀)]
//! [   ...     ...    ...    .]  [. ] = [   ...    ]
//! [γ(xₙ,x₁) ... γ(xₙ,xₙ) 1] [wₙ]   [γ(xₙ,x₀)]
//! [  1       ...    1       0] [μ ]   [    1     ]
//! ```
//! where γ is the semivariance from the fitted variogram, x₀ is the
//! target location, and μ is the Lagrange multiplier ensuring Σwᵢ = 1.
//!
//! Every sample enters the system, so the left-hand side is the same for
//! all grid nodes and is factored once per surface.
//!
//! Reference:
//! Matheron, G. (1963). Principles of geostatistics. Economic Geology.

use crate::linalg::LuDecomposition;
use crate::maybe_rayon::*;
use cheaqi_core::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::variogram::{empirical_variogram, fit_variogram, FittedVariogram, VariogramModel};
use super::{is_constant, merge_coincident, Grid, SamplePoint};

/// Parameters for Ordinary Kriging interpolation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KrigingParams {
    /// Model fitted to the empirical variogram (default linear)
    pub variogram_model: VariogramModel,
    /// Number of lag bins for the empirical variogram (default 6)
    pub n_lags: usize,
    /// Whether to produce the kriging variance alongside the estimate
    pub compute_variance: bool,
}

impl Default for KrigingParams {
    fn default() -> Self {
        Self {
            variogram_model: VariogramModel::default(),
            n_lags: 6,
            compute_variance: true,
        }
    }
}

/// Result of Ordinary Kriging interpolation
#[derive(Debug, Clone)]
pub struct KrigingResult {
    /// Interpolated values in raster order
    pub estimate: Array2<f64>,
    /// Kriging variance (estimation uncertainty). `None` if not requested.
    pub variance: Option<Array2<f64>>,
    /// Variogram used for the system; `None` for constant inputs
    pub variogram: Option<FittedVariogram>,
}

/// Fit `model` to the samples, falling back to a plain model spanning the
/// sample variance when the empirical variogram has too few usable lags.
pub fn fit_for_points(
    points: &[SamplePoint],
    model: VariogramModel,
    n_lags: usize,
) -> Result<FittedVariogram> {
    let empirical = empirical_variogram(points, n_lags)?;

    match fit_variogram(&empirical, model) {
        Ok(fitted) => Ok(fitted),
        Err(e) => {
            debug!("variogram fit failed ({}), using variance-based {} model", e, model);
            fallback_variogram(points, model)
        }
    }
}

fn fallback_variogram(points: &[SamplePoint], model: VariogramModel) -> Result<FittedVariogram> {
    let n = points.len() as f64;
    let mean = points.iter().map(|p| p.value).sum::<f64>() / n;
    let variance = points.iter().map(|p| (p.value - mean).powi(2)).sum::<f64>() / n;

    let mut max_dist = 0.0_f64;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            max_dist = max_dist.max(a.dist(b.x, b.y));
        }
    }

    if !(variance > 0.0 && max_dist > 0.0) {
        return Err(Error::Algorithm(
            "cannot derive a variogram from degenerate samples".into(),
        ));
    }

    Ok(FittedVariogram {
        model,
        nugget: 0.0,
        sill: variance,
        range: max_dist / 2.0,
        partial_sill: variance,
        rss: f64::NAN,
    })
}

/// Ordinary Kriging of `points` onto `grid` with a variogram fitted from the
/// samples themselves.
///
/// Samples sharing coordinates are merged (mean value) before fitting. When
/// every sample has the same value the surface is that constant with zero
/// variance, and no system is solved.
///
/// # Errors
/// - [`Error::InsufficientData`] with fewer than 2 samples
/// - [`Error::Algorithm`] if the kriging system is singular
pub fn ordinary_kriging(
    points: &[SamplePoint],
    grid: &Grid,
    params: &KrigingParams,
) -> Result<KrigingResult> {
    if points.len() < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            found: points.len(),
        });
    }

    let shape = grid.shape();
    if is_constant(points) {
        return Ok(KrigingResult {
            estimate: Array2::from_elem(shape, points[0].value),
            variance: params.compute_variance.then(|| Array2::zeros(shape)),
            variogram: None,
        });
    }

    let merged = merge_coincident(points);
    if merged.len() < 2 {
        // All samples at one location: nothing to krige spatially
        let mean = merged[0].value;
        return Ok(KrigingResult {
            estimate: Array2::from_elem(shape, mean),
            variance: params.compute_variance.then(|| Array2::zeros(shape)),
            variogram: None,
        });
    }

    let variogram = fit_for_points(&merged, params.variogram_model, params.n_lags)?;
    debug!(
        "fitted {} variogram: nugget={:.4} sill={:.4} range={:.4}",
        variogram.model, variogram.nugget, variogram.sill, variogram.range
    );

    let (estimate, variance) =
        krige_with_variogram(&merged, grid, &variogram, params.compute_variance)?;

    Ok(KrigingResult {
        estimate,
        variance,
        variogram: Some(variogram),
    })
}

/// Solve the global kriging system for every grid node with a given variogram.
pub fn krige_with_variogram(
    points: &[SamplePoint],
    grid: &Grid,
    variogram: &FittedVariogram,
    compute_variance: bool,
) -> Result<(Array2<f64>, Option<Array2<f64>>)> {
    let k = points.len();
    if k < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            found: k,
        });
    }

    // Build kriging system (k+1) × (k+1)
    let m = k + 1;
    let mut mat = vec![0.0_f64; m * m];
    for i in 0..k {
        let pi = &points[i];
        for j in (i + 1)..k {
            let g = variogram.evaluate(pi.dist(points[j].x, points[j].y));
            mat[i * m + j] = g;
            mat[j * m + i] = g;
        }
        // Lagrange constraint column and row
        mat[i * m + k] = 1.0;
        mat[k * m + i] = 1.0;
    }

    let lu = LuDecomposition::factor(m, mat)
        .map_err(|e| Error::Algorithm(format!("kriging system: {}", e)))?;

    let (rows, cols) = grid.shape();
    let output: Vec<(f64, f64)> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![(f64::NAN, f64::NAN); cols];
            let mut rhs = vec![0.0_f64; m];

            for (col, cell) in row_data.iter_mut().enumerate() {
                let (x0, y0) = grid.node(row, col);

                // RHS: γ(xᵢ, x₀) for each sample, plus 1.0 for constraint
                for (r, pt) in rhs.iter_mut().zip(points) {
                    *r = variogram.evaluate(pt.dist(x0, y0));
                }
                rhs[k] = 1.0;

                let solution = lu.solve(&rhs);

                // z₀ = Σ wᵢ · zᵢ
                let estimate: f64 = solution[..k]
                    .iter()
                    .zip(points)
                    .map(|(w, pt)| w * pt.value)
                    .sum();

                // σ² = Σ wᵢ·γ(xᵢ,x₀) + μ
                let variance = if compute_variance {
                    let var: f64 = solution[k]
                        + solution[..k]
                            .iter()
                            .zip(&rhs[..k])
                            .map(|(w, g)| w * g)
                            .sum::<f64>();
                    var.max(0.0)
                } else {
                    f64::NAN
                };

                *cell = (estimate, variance);
            }

            row_data
        })
        .collect();

    let estimate = Array2::from_shape_vec((rows, cols), output.iter().map(|(e, _)| *e).collect())
        .map_err(|e| Error::Other(e.to_string()))?;
    let variance = if compute_variance {
        Some(
            Array2::from_shape_vec((rows, cols), output.iter().map(|(_, v)| *v).collect())
                .map_err(|e| Error::Other(e.to_string()))?,
        )
    } else {
        None
    };

    Ok((estimate, variance))
}
