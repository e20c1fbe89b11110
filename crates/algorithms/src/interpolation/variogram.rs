//! Variogram estimation for kriging
//!
//! The empirical semivariance of pairs binned by separation distance,
//! ```text
//! γ(h) = (1/2N(h)) Σ [z(xᵢ) - z(xⱼ)]²
//! ```
//! is fitted with one of four models. For a fixed range every model is
//! linear in nugget and partial sill, so those two come from a closed-form
//! weighted least-squares solve; only bounded models search over the range.

use cheaqi_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::SamplePoint;

/// Candidate ranges tried for bounded models, spread over `(0, 2 * max_lag]`
const RANGE_STEPS: usize = 40;

/// Non-empty lag bins of the empirical variogram.
#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalVariogram {
    /// Mean pair distance in each bin
    pub lags: Vec<f64>,
    pub semivariance: Vec<f64>,
    pub pair_counts: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariogramModel {
    /// γ(h) = c₀ + c·h/a, unbounded
    #[default]
    Linear,
    /// γ(h) = c₀ + c·[1.5(h/a) - 0.5(h/a)³] up to a, then c₀ + c
    Spherical,
    /// γ(h) = c₀ + c·[1 - exp(-3h/a)]
    Exponential,
    /// γ(h) = c₀ + c·[1 - exp(-3h²/a²)]
    Gaussian,
}

impl VariogramModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariogramModel::Linear => "linear",
            VariogramModel::Spherical => "spherical",
            VariogramModel::Exponential => "exponential",
            VariogramModel::Gaussian => "gaussian",
        }
    }

    /// Model curve at scaled distance `t = h / a`, without nugget and sill
    fn shape(&self, t: f64) -> f64 {
        match self {
            VariogramModel::Linear => t,
            VariogramModel::Spherical if t >= 1.0 => 1.0,
            VariogramModel::Spherical => 1.5 * t - 0.5 * t * t * t,
            VariogramModel::Exponential => 1.0 - (-3.0 * t).exp(),
            VariogramModel::Gaussian => 1.0 - (-3.0 * t * t).exp(),
        }
    }
}

impl fmt::Display for VariogramModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariogramModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(VariogramModel::Linear),
            "spherical" => Ok(VariogramModel::Spherical),
            "exponential" => Ok(VariogramModel::Exponential),
            "gaussian" => Ok(VariogramModel::Gaussian),
            _ => Err(Error::InvalidParameter {
                name: "variogram_model",
                value: s.to_string(),
                reason: "expected linear, spherical, exponential or gaussian".into(),
            }),
        }
    }
}

/// Fitted variogram parameters.
///
/// For the linear model `range` is the largest fitted lag and
/// `partial_sill / range` is the slope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedVariogram {
    pub model: VariogramModel,
    pub nugget: f64,
    /// nugget + partial sill
    pub sill: f64,
    pub range: f64,
    pub partial_sill: f64,
    /// Pair-weighted residual sum of squares; NaN when not fitted
    pub rss: f64,
}

impl FittedVariogram {
    /// γ(h). Zero at h = 0 even with a nugget.
    pub fn evaluate(&self, h: f64) -> f64 {
        if h < 1e-15 {
            return 0.0;
        }
        self.nugget + self.partial_sill * self.model.shape(h / self.range)
    }
}

/// Bin every sample pair up to half the largest pair distance into
/// `n_lags` equal-width bins. Empty bins are left out.
pub fn empirical_variogram(points: &[SamplePoint], n_lags: usize) -> Result<EmpiricalVariogram> {
    if points.len() < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            found: points.len(),
        });
    }
    if n_lags == 0 {
        return Err(Error::InvalidParameter {
            name: "variogram_lags",
            value: "0".into(),
            reason: "need at least one lag bin".into(),
        });
    }

    let pairs: Vec<(f64, f64)> = points
        .iter()
        .enumerate()
        .flat_map(|(i, a)| {
            points[i + 1..]
                .iter()
                .map(move |b| (a.dist(b.x, b.y), (a.value - b.value).powi(2)))
        })
        .collect();

    let max_lag = pairs.iter().map(|(d, _)| *d).fold(0.0_f64, f64::max) / 2.0;
    if max_lag <= 0.0 {
        return Err(Error::Algorithm("all samples share one location".into()));
    }
    let width = max_lag / n_lags as f64;

    // (sum of distances, sum of squared differences, pairs) per bin
    let mut bins = vec![(0.0_f64, 0.0_f64, 0_usize); n_lags];
    for &(d, sq) in &pairs {
        if d <= 0.0 || d > max_lag {
            continue;
        }
        let bin = ((d / width) as usize).min(n_lags - 1);
        bins[bin].0 += d;
        bins[bin].1 += sq;
        bins[bin].2 += 1;
    }

    let mut empirical = EmpiricalVariogram {
        lags: Vec::with_capacity(n_lags),
        semivariance: Vec::with_capacity(n_lags),
        pair_counts: Vec::with_capacity(n_lags),
    };
    for (dist, sq, count) in bins.into_iter().filter(|b| b.2 > 0) {
        empirical.lags.push(dist / count as f64);
        empirical.semivariance.push(sq / (2.0 * count as f64));
        empirical.pair_counts.push(count);
    }
    Ok(empirical)
}

/// Weighted least squares of `y ≈ c0 + c·f` with `c0 ≥ 0`.
/// Returns `(c0, c, rss)`, or `None` when `c` is not positive.
fn solve_nugget_and_sill(f: &[f64], y: &[f64], w: &[f64]) -> Option<(f64, f64, f64)> {
    let mut sums = [0.0_f64; 5]; // Σw, Σwf, Σwy, Σwf², Σwfy
    for ((&fi, &yi), &wi) in f.iter().zip(y).zip(w) {
        sums[0] += wi;
        sums[1] += wi * fi;
        sums[2] += wi * yi;
        sums[3] += wi * fi * fi;
        sums[4] += wi * fi * yi;
    }
    let [sw, sf, sy, sff, sfy] = sums;

    let det = sw * sff - sf * sf;
    let (mut c0, mut c) = if det.abs() > 1e-12 * sw * sff {
        let c = (sw * sfy - sf * sy) / det;
        ((sy - c * sf) / sw, c)
    } else {
        (-1.0, 0.0)
    };
    if c0 < 0.0 {
        // Through the origin
        c0 = 0.0;
        c = if sff > 0.0 { sfy / sff } else { 0.0 };
    }
    if !(c > 0.0 && c.is_finite()) {
        return None;
    }

    let rss = f
        .iter()
        .zip(y)
        .zip(w)
        .map(|((&fi, &yi), &wi)| wi * (yi - c0 - c * fi).powi(2))
        .sum();
    Some((c0, c, rss))
}

/// Fit `model` to `empirical`, weighting each lag by its pair count.
///
/// # Errors
/// [`Error::Algorithm`] with too few lags (2 for linear, 3 otherwise) or
/// when semivariance does not grow with distance.
pub fn fit_variogram(empirical: &EmpiricalVariogram, model: VariogramModel) -> Result<FittedVariogram> {
    let needed = if model == VariogramModel::Linear { 2 } else { 3 };
    if empirical.lags.len() < needed {
        return Err(Error::Algorithm(format!(
            "{} lag bins with pairs, {} needs at least {}",
            empirical.lags.len(),
            model,
            needed
        )));
    }

    let max_lag = empirical.lags.iter().copied().fold(0.0_f64, f64::max);
    let weights: Vec<f64> = empirical.pair_counts.iter().map(|&n| n as f64).collect();
    let ranges: Vec<f64> = match model {
        VariogramModel::Linear => vec![max_lag],
        _ => (1..=RANGE_STEPS)
            .map(|i| 2.0 * max_lag * i as f64 / RANGE_STEPS as f64)
            .collect(),
    };

    let mut best: Option<FittedVariogram> = None;
    for range in ranges {
        let f: Vec<f64> = empirical.lags.iter().map(|&h| model.shape(h / range)).collect();
        let Some((nugget, partial_sill, rss)) =
            solve_nugget_and_sill(&f, &empirical.semivariance, &weights)
        else {
            continue;
        };
        if best.as_ref().is_none_or(|b| rss < b.rss) {
            best = Some(FittedVariogram {
                model,
                nugget,
                sill: nugget + partial_sill,
                range,
                partial_sill,
                rss,
            });
        }
    }

    best.ok_or_else(|| Error::Algorithm(format!("semivariance does not grow with distance ({})", model)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn binned(model: &FittedVariogram, lags: &[f64]) -> EmpiricalVariogram {
        EmpiricalVariogram {
            lags: lags.to_vec(),
            semivariance: lags.iter().map(|&h| model.evaluate(h)).collect(),
            pair_counts: vec![10; lags.len()],
        }
    }

    #[test]
    fn test_empirical_on_a_line() {
        // Distances 1 (3 pairs), 2 (2 pairs), 3 (1 pair); max lag 1.5
        let points: Vec<SamplePoint> = (0..4)
            .map(|i| SamplePoint::new(i as f64, 0.0, i as f64))
            .collect();
        let emp = empirical_variogram(&points, 3).unwrap();

        assert_eq!(emp.lags, vec![1.0]);
        assert_eq!(emp.pair_counts, vec![3]);
        assert_relative_eq!(emp.semivariance[0], 0.5);
    }

    #[test]
    fn test_empirical_errors() {
        let one = [SamplePoint::new(0.0, 0.0, 1.0)];
        assert!(matches!(empirical_variogram(&one, 6), Err(Error::InsufficientData { .. })));

        let stacked = [SamplePoint::new(1.0, 1.0, 1.0), SamplePoint::new(1.0, 1.0, 3.0)];
        assert!(matches!(empirical_variogram(&stacked, 6), Err(Error::Algorithm(_))));
    }

    #[test]
    fn test_linear_fit_is_exact_on_a_line() {
        let emp = EmpiricalVariogram {
            lags: vec![1.0, 2.0, 3.0, 4.0],
            semivariance: vec![2.5, 4.5, 6.5, 8.5],
            pair_counts: vec![4, 9, 2, 7],
        };
        let fitted = fit_variogram(&emp, VariogramModel::Linear).unwrap();

        assert_relative_eq!(fitted.nugget, 0.5, epsilon = 1e-9);
        assert_relative_eq!(fitted.partial_sill / fitted.range, 2.0, epsilon = 1e-9);
        assert_relative_eq!(fitted.evaluate(3.0), 6.5, epsilon = 1e-9);
        assert!(fitted.rss < 1e-12);
    }

    #[test]
    fn test_negative_nugget_is_clamped() {
        let emp = EmpiricalVariogram {
            lags: vec![1.0, 2.0, 3.0, 4.0],
            semivariance: vec![1.0, 3.0, 5.0, 7.0],
            pair_counts: vec![1; 4],
        };
        let fitted = fit_variogram(&emp, VariogramModel::Linear).unwrap();

        assert_eq!(fitted.nugget, 0.0);
        // Σhγ / Σh² = 50 / 30
        assert_relative_eq!(fitted.partial_sill / fitted.range, 50.0 / 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bounded_models_recover_parameters() {
        // Range 40 lies on the candidate lattice for a largest lag of 50
        let lags: Vec<f64> = (1..=10).map(|i| 5.0 * i as f64).collect();
        for model in [VariogramModel::Spherical, VariogramModel::Exponential, VariogramModel::Gaussian] {
            let truth = FittedVariogram {
                model,
                nugget: 1.0,
                sill: 10.0,
                range: 40.0,
                partial_sill: 9.0,
                rss: 0.0,
            };
            let fitted = fit_variogram(&binned(&truth, &lags), model).unwrap();

            assert_relative_eq!(fitted.range, 40.0, epsilon = 1e-9);
            assert_relative_eq!(fitted.nugget, 1.0, epsilon = 1e-6);
            assert_relative_eq!(fitted.sill, 10.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_flat_semivariance_cannot_be_fitted() {
        let emp = EmpiricalVariogram {
            lags: vec![1.0, 2.0, 3.0],
            semivariance: vec![4.0, 3.0, 2.0],
            pair_counts: vec![5; 3],
        };
        assert!(fit_variogram(&emp, VariogramModel::Linear).is_err());

        let short = EmpiricalVariogram {
            lags: vec![1.0, 2.0],
            semivariance: vec![1.0, 2.0],
            pair_counts: vec![5; 2],
        };
        assert!(fit_variogram(&short, VariogramModel::Spherical).is_err());
        assert!(fit_variogram(&short, VariogramModel::Linear).is_ok());
    }

    #[test]
    fn test_evaluate() {
        let spherical = FittedVariogram {
            model: VariogramModel::Spherical,
            nugget: 1.0,
            sill: 10.0,
            range: 50.0,
            partial_sill: 9.0,
            rss: 0.0,
        };
        assert_eq!(spherical.evaluate(0.0), 0.0);
        assert_relative_eq!(spherical.evaluate(50.0), 10.0);
        assert_relative_eq!(spherical.evaluate(120.0), 10.0);

        let linear = FittedVariogram {
            model: VariogramModel::Linear,
            nugget: 0.5,
            sill: 2.5,
            range: 10.0,
            partial_sill: 2.0,
            rss: 0.0,
        };
        assert_relative_eq!(linear.evaluate(5.0), 1.5);
        assert_relative_eq!(linear.evaluate(40.0), 8.5);
    }

    #[test]
    fn test_model_names() {
        assert_eq!("Spherical".parse::<VariogramModel>().unwrap(), VariogramModel::Spherical);
        assert_eq!(VariogramModel::default().to_string(), "linear");
        assert!("matern".parse::<VariogramModel>().is_err());
    }
}
