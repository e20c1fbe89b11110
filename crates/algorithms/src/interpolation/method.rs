//! Method dispatch
//!
//! The set of methods is closed: [`MethodKind`] names them (with the aliases
//! used by older batch scripts), [`InterpolationMethod`] carries the
//! per-method parameters.

use cheaqi_core::{CRS, Error, Raster, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::idw::{idw, IdwParams};
use super::kriging::{ordinary_kriging, KrigingParams};
use super::rbf::{rbf_interpolation, RbfParams};
use super::variogram::FittedVariogram;
use super::{Grid, SamplePoint};

/// Interpolation method name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    Kriging,
    Idw,
    Rbf,
}

impl MethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::Kriging => "kriging",
            MethodKind::Idw => "idw",
            MethodKind::Rbf => "rbf",
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kriging" | "ok" | "ordinary_kriging" | "pykrige_ok" => Ok(MethodKind::Kriging),
            "idw" | "python_idw_kdtree" | "gdal_grid" => Ok(MethodKind::Idw),
            "rbf" => Ok(MethodKind::Rbf),
            _ => Err(Error::InvalidParameter {
                name: "method",
                value: s.to_string(),
                reason: "expected kriging, idw or rbf".into(),
            }),
        }
    }
}

/// A method together with its parameters
#[derive(Debug, Clone, PartialEq)]
pub enum InterpolationMethod {
    Kriging(KrigingParams),
    Idw(IdwParams),
    Rbf(RbfParams),
}

impl InterpolationMethod {
    pub fn kind(&self) -> MethodKind {
        match self {
            InterpolationMethod::Kriging(_) => MethodKind::Kriging,
            InterpolationMethod::Idw(_) => MethodKind::Idw,
            InterpolationMethod::Rbf(_) => MethodKind::Rbf,
        }
    }

    /// Minimum number of samples the method can work with
    pub fn min_points(&self) -> usize {
        match self {
            InterpolationMethod::Kriging(_) => 2,
            InterpolationMethod::Idw(_) | InterpolationMethod::Rbf(_) => 1,
        }
    }
}

impl From<MethodKind> for InterpolationMethod {
    fn from(kind: MethodKind) -> Self {
        match kind {
            MethodKind::Kriging => InterpolationMethod::Kriging(KrigingParams::default()),
            MethodKind::Idw => InterpolationMethod::Idw(IdwParams::default()),
            MethodKind::Rbf => InterpolationMethod::Rbf(RbfParams::default()),
        }
    }
}

/// Estimated surface over a grid, in raster order
#[derive(Debug, Clone)]
pub struct Surface {
    pub estimate: Array2<f64>,
    /// Estimation variance, where the method provides one (kriging)
    pub variance: Option<Array2<f64>>,
    /// Variogram behind a kriging estimate
    pub variogram: Option<FittedVariogram>,
}

impl Surface {
    /// Georeferenced Float32 raster of the estimate
    pub fn to_raster(&self, grid: &Grid, crs: &CRS, description: impl Into<String>) -> Raster<f32> {
        array_to_raster(&self.estimate, grid, crs, description.into())
    }

    /// Georeferenced Float32 raster of the variance, if any
    pub fn variance_raster(&self, grid: &Grid, crs: &CRS, description: impl Into<String>) -> Option<Raster<f32>> {
        self.variance
            .as_ref()
            .map(|v| array_to_raster(v, grid, crs, description.into()))
    }

    /// (min, max) over the finite estimates
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.estimate
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

fn array_to_raster(data: &Array2<f64>, grid: &Grid, crs: &CRS, description: String) -> Raster<f32> {
    let mut raster = Raster::from_array(data.mapv(|v| v as f32));
    raster.set_transform(grid.transform());
    raster.set_crs(Some(crs.clone()));
    raster.set_description(Some(description));
    raster
}

/// Estimate a value at every node of `grid` from `points`.
///
/// # Errors
/// - [`Error::InsufficientData`] when there are fewer samples than the
///   method needs
/// - [`Error::InvalidParameter`] for non-finite samples or bad parameters
/// - [`Error::Algorithm`] when the method's linear system is singular
pub fn interpolate(points: &[SamplePoint], grid: &Grid, method: &InterpolationMethod) -> Result<Surface> {
    if points.len() < method.min_points() {
        return Err(Error::InsufficientData {
            required: method.min_points(),
            found: points.len(),
        });
    }
    if let Some(bad) = points
        .iter()
        .find(|p| !(p.x.is_finite() && p.y.is_finite() && p.value.is_finite()))
    {
        return Err(Error::InvalidParameter {
            name: "points",
            value: format!("({}, {}) = {}", bad.x, bad.y, bad.value),
            reason: "samples must be finite".into(),
        });
    }

    match method {
        InterpolationMethod::Kriging(params) => {
            let result = ordinary_kriging(points, grid, params)?;
            Ok(Surface {
                estimate: result.estimate,
                variance: result.variance,
                variogram: result.variogram,
            })
        }
        InterpolationMethod::Idw(params) => Ok(Surface {
            estimate: idw(points, grid, params)?,
            variance: None,
            variogram: None,
        }),
        InterpolationMethod::Rbf(params) => Ok(Surface {
            estimate: rbf_interpolation(points, grid, params)?,
            variance: None,
            variogram: None,
        }),
    }
}
