//! Run configuration.

use cheaqi_algorithms::interpolation::{
    GridSpec, IdwParams, InterpolationMethod, KrigingParams, MethodKind, RbfFunction, RbfParams,
    Resolution, VariogramModel,
};
use cheaqi_core::CRS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{PipelineError, Result};

/// How dated samples are split into jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalMode {
    /// Daily when the dataset has dates, aggregate otherwise
    #[default]
    Auto,
    /// One job per (variable, date)
    Daily,
    /// One job per variable over all samples
    Aggregate,
}

/// Top-level pipeline configuration.
///
/// Every field has a default, so `{}` is a valid configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Latitude column; detected when absent
    pub lat_column: Option<String>,
    /// Longitude column; detected when absent
    pub lon_column: Option<String>,
    /// Date column; the first text date candidate when absent
    pub date_column: Option<String>,
    /// Variables to interpolate, in geostack order; detected when empty
    pub variables: Vec<String>,

    /// `kriging`, `idw` or `rbf` (legacy aliases accepted)
    pub method: String,
    pub resolution: Resolution,
    pub buffer_fraction: f64,
    pub min_buffer: Option<f64>,
    pub max_cells: usize,

    /// Minimum samples for a variable to be interpolated at all
    pub min_points: usize,
    /// Minimum samples for one daily job
    pub daily_min_points: usize,
    /// Keep only the first N dates of each variable
    pub max_days_per_variable: Option<usize>,

    pub variogram_model: String,
    pub variogram_lags: usize,
    pub idw_power: f64,
    pub rbf_function: String,
    pub rbf_epsilon: Option<f64>,
    pub rbf_smoothing: f64,

    pub crs: String,
    pub temporal_mode: TemporalMode,
    /// Use one grid covering every variable's samples
    pub shared_grid: bool,
    /// Assemble the all-variables geostack
    pub combined_geostack: bool,
    /// Also write the kriging variance as a separate raster
    pub write_variance: bool,

    /// Worker threads for jobs
    pub jobs: usize,
    /// Wall-clock limit for the whole run
    pub timeout_secs: Option<u64>,
    /// Fixed run id; random when absent
    pub run_id: Option<String>,
    /// Output file prefix; the input file stem when absent
    pub output_prefix: Option<String>,
    /// Field delimiter; sniffed from the header when absent
    pub delimiter: Option<char>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lat_column: None,
            lon_column: None,
            date_column: None,
            variables: Vec::new(),
            method: MethodKind::Kriging.to_string(),
            resolution: Resolution::default(),
            buffer_fraction: 0.1,
            min_buffer: Some(0.01),
            max_cells: 400,
            min_points: 10,
            daily_min_points: 5,
            max_days_per_variable: None,
            variogram_model: VariogramModel::default().to_string(),
            variogram_lags: 6,
            idw_power: 2.0,
            rbf_function: RbfFunction::default().to_string(),
            rbf_epsilon: None,
            rbf_smoothing: 0.0,
            crs: "EPSG:4326".to_string(),
            temporal_mode: TemporalMode::Auto,
            shared_grid: true,
            combined_geostack: true,
            write_variance: false,
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            timeout_secs: None,
            run_id: None,
            output_prefix: None,
            delimiter: None,
        }
    }
}

/// Typed settings derived from a validated [`PipelineConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub method: InterpolationMethod,
    pub grid: GridSpec,
    pub crs: CRS,
    pub delimiter: Option<u8>,
}

fn invalid(setting: &str, msg: impl Into<String>) -> PipelineError {
    PipelineError::InvalidConfig {
        setting: setting.to_string(),
        message: msg.into(),
    }
}

impl PipelineConfig {
    /// Load a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PipelineError::InputNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text)
            .map_err(|e| invalid(&path.display().to_string(), e.to_string()))
    }

    /// Validate every setting and build the typed parameters.
    ///
    /// Runs before any input is read, so a bad configuration never leaves
    /// partial output behind.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        if !(self.buffer_fraction >= 0.0 && self.buffer_fraction.is_finite()) {
            return Err(invalid(
                "buffer_fraction",
                format!("buffer_fraction must be >= 0, got {}", self.buffer_fraction),
            ));
        }
        if let Some(b) = self.min_buffer {
            if !(b >= 0.0 && b.is_finite()) {
                return Err(invalid("min_buffer", format!("min_buffer must be >= 0, got {}", b)));
            }
        }
        match self.resolution {
            Resolution::Cells(n) if n < 2 => {
                return Err(invalid("resolution", format!("resolution needs at least 2 cells, got {}", n)));
            }
            Resolution::CellSize(s) if !(s > 0.0 && s.is_finite()) => {
                return Err(invalid("resolution", format!("cell_size must be > 0, got {}", s)));
            }
            _ => {}
        }
        if self.max_cells < 2 {
            return Err(invalid("max_cells", format!("max_cells must be >= 2, got {}", self.max_cells)));
        }
        if self.jobs == 0 {
            return Err(invalid("jobs", "jobs must be >= 1"));
        }
        if self.variogram_lags == 0 {
            return Err(invalid("variogram_lags", "variogram_lags must be >= 1"));
        }
        if !(self.idw_power > 0.0 && self.idw_power.is_finite()) {
            return Err(invalid("idw_power", format!("idw_power must be > 0, got {}", self.idw_power)));
        }
        if self.rbf_smoothing < 0.0 {
            return Err(invalid(
                "rbf_smoothing",
                format!("rbf_smoothing must be >= 0, got {}", self.rbf_smoothing),
            ));
        }
        if let Some(id) = &self.run_id {
            if id.is_empty() || id.contains(['/', '\\']) {
                return Err(invalid("run_id", format!("run_id '{}' is not usable in a file name", id)));
            }
        }

        let kind = MethodKind::from_str(&self.method)
            .map_err(|_| PipelineError::UnsupportedMethod(self.method.clone()))?;
        let method = match kind {
            MethodKind::Kriging => InterpolationMethod::Kriging(KrigingParams {
                variogram_model: VariogramModel::from_str(&self.variogram_model)
                    .map_err(|e| invalid("variogram_model", e.to_string()))?,
                n_lags: self.variogram_lags,
                compute_variance: true,
            }),
            MethodKind::Idw => InterpolationMethod::Idw(IdwParams {
                power: self.idw_power,
            }),
            MethodKind::Rbf => InterpolationMethod::Rbf(RbfParams {
                function: RbfFunction::from_str(&self.rbf_function)
                    .map_err(|e| invalid("rbf_function", e.to_string()))?,
                epsilon: self.rbf_epsilon,
                smoothing: self.rbf_smoothing,
            }),
        };

        let crs = CRS::from_str(&self.crs).map_err(|e| invalid("crs", e.to_string()))?;

        let delimiter = match self.delimiter {
            None => None,
            Some(c) if c.is_ascii() && c != '"' && c != '\n' => Some(c as u8),
            Some(c) => return Err(invalid("delimiter", format!("unusable delimiter {:?}", c))),
        };

        Ok(ResolvedConfig {
            method,
            grid: GridSpec {
                resolution: self.resolution,
                buffer_fraction: self.buffer_fraction,
                min_buffer: self.min_buffer,
                max_cells: self.max_cells,
            },
            crs,
            delimiter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_empty_json_is_default() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.method, "kriging");
        assert_eq!(config.min_points, 10);
        assert_eq!(config.daily_min_points, 5);
        assert_eq!(config.max_cells, 400);
        assert_eq!(config.crs, "EPSG:4326");

        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.crs, CRS::wgs84());
        assert!(matches!(resolved.method, InterpolationMethod::Kriging(_)));
    }

    #[test]
    fn test_resolution_tagging() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"resolution": {"cell_size": 0.005}, "method": "gdal_grid"}"#)
                .unwrap();
        assert_eq!(config.resolution, Resolution::CellSize(0.005));
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.method.kind(), MethodKind::Idw);
    }

    #[test]
    fn test_unknown_method() {
        let config = PipelineConfig {
            method: "spline".into(),
            ..Default::default()
        };
        let err = config.resolve().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedMethod);
    }

    #[test]
    fn test_invalid_values() {
        let bad = [
            PipelineConfig {
                buffer_fraction: -0.1,
                ..Default::default()
            },
            PipelineConfig {
                resolution: Resolution::Cells(1),
                ..Default::default()
            },
            PipelineConfig {
                jobs: 0,
                ..Default::default()
            },
            PipelineConfig {
                variogram_model: "cubic".into(),
                ..Default::default()
            },
            PipelineConfig {
                crs: "EPSG:abc".into(),
                ..Default::default()
            },
        ];
        let settings = ["buffer_fraction", "resolution", "jobs", "variogram_model", "crs"];
        for (config, setting) in bad.into_iter().zip(settings) {
            let err = config.resolve().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SchemaError, "{:?}", config);
            assert_eq!(err.identifier().as_deref(), Some(setting));
        }
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = PipelineConfig::load(dir.path().join("nope.json")).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::InputNotFound);

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let bad = PipelineConfig::load(&path).unwrap_err();
        assert!(matches!(bad, PipelineError::InvalidConfig { .. }));
        assert_eq!(bad.identifier(), Some(path.display().to_string()));
    }
}
