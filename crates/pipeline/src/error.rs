//! Pipeline error taxonomy
//!
//! Job-level errors (`InsufficientData`, `InterpolationFailure`, job-local
//! `Io`) are recorded in the run report; everything else aborts the run.
//! Every error converts to a [`StructuredError`] for JSON consumers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("input not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("schema error: {message}")]
    Schema {
        message: String,
        /// Column name, or the table/file the problem was found in
        identifier: Option<String>,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfig { setting: String, message: String },

    #[error("insufficient data for {job}: need at least {required} points, got {found}")]
    InsufficientData {
        job: String,
        required: usize,
        found: usize,
    },

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("interpolation failed for {job}: {reason}")]
    InterpolationFailure { job: String, reason: String },

    #[error("shape mismatch in {}: {reason}", path.display())]
    ShapeMismatch { path: PathBuf, reason: String },

    #[error("I/O error on {}: {reason}", path.display())]
    Io { path: PathBuf, reason: String },

    #[error("run timed out after {secs} s")]
    Timeout { secs: u64 },
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error category as exposed to external callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputNotFound,
    SchemaError,
    InsufficientData,
    UnsupportedMethod,
    InterpolationFailure,
    ShapeMismatch,
    IoError,
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InputNotFound => "input_not_found",
            ErrorKind::SchemaError => "schema_error",
            ErrorKind::InsufficientData => "insufficient_data",
            ErrorKind::UnsupportedMethod => "unsupported_method",
            ErrorKind::InterpolationFailure => "interpolation_failure",
            ErrorKind::ShapeMismatch => "shape_mismatch",
            ErrorKind::IoError => "io_error",
            ErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// `{kind, message, identifier}` form of an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredError {
    pub kind: ErrorKind,
    pub message: String,
    /// The path, job key or method name the error refers to
    pub identifier: Option<String>,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InputNotFound { .. } => ErrorKind::InputNotFound,
            PipelineError::Schema { .. } | PipelineError::InvalidConfig { .. } => {
                ErrorKind::SchemaError
            }
            PipelineError::InsufficientData { .. } => ErrorKind::InsufficientData,
            PipelineError::UnsupportedMethod(_) => ErrorKind::UnsupportedMethod,
            PipelineError::InterpolationFailure { .. } => ErrorKind::InterpolationFailure,
            PipelineError::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            PipelineError::Io { .. } => ErrorKind::IoError,
            PipelineError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Schema error naming the offending column or file
    pub fn schema(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Schema {
            message: message.into(),
            identifier: Some(identifier.into()),
        }
    }

    /// Fill in a missing schema identifier, leaving other errors untouched
    pub fn or_identifier(self, identifier: impl Into<String>) -> Self {
        match self {
            PipelineError::Schema {
                message,
                identifier: None,
            } => PipelineError::Schema {
                message,
                identifier: Some(identifier.into()),
            },
            other => other,
        }
    }

    pub fn identifier(&self) -> Option<String> {
        match self {
            PipelineError::InputNotFound { path }
            | PipelineError::Io { path, .. }
            | PipelineError::ShapeMismatch { path, .. } => Some(path.display().to_string()),
            PipelineError::Schema { identifier, .. } => identifier.clone(),
            PipelineError::InvalidConfig { setting, .. } => Some(setting.clone()),
            PipelineError::InsufficientData { job, .. }
            | PipelineError::InterpolationFailure { job, .. } => Some(job.clone()),
            PipelineError::UnsupportedMethod(name) => Some(name.clone()),
            PipelineError::Timeout { .. } => Some("timeout_secs".to_string()),
        }
    }

    pub fn to_structured(&self) -> StructuredError {
        StructuredError {
            kind: self.kind(),
            message: self.to_string(),
            identifier: self.identifier(),
        }
    }

    /// Classify a core error raised while producing `job`.
    pub fn from_job(job: &str, path: Option<&std::path::Path>, err: cheaqi_core::Error) -> Self {
        use cheaqi_core::Error as E;
        match err {
            E::InsufficientData { required, found } => PipelineError::InsufficientData {
                job: job.to_string(),
                required,
                found,
            },
            E::Io(_) | E::Tiff(_) => PipelineError::Io {
                path: path.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(job)),
                reason: err.to_string(),
            },
            other => PipelineError::InterpolationFailure {
                job: job.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Classify a core error raised while reading or writing `path`.
    pub fn from_io(path: &std::path::Path, err: cheaqi_core::Error) -> Self {
        use cheaqi_core::Error as E;
        match err {
            E::SizeMismatch { .. } | E::TransformMismatch { .. } | E::CrsMismatch { .. } => {
                PipelineError::ShapeMismatch {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                }
            }
            other => PipelineError::Io {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_json() {
        let err = PipelineError::UnsupportedMethod("spline".into());
        let json = serde_json::to_value(err.to_structured()).unwrap();
        assert_eq!(json["kind"], "unsupported_method");
        assert_eq!(json["identifier"], "spline");
        assert!(json["message"].as_str().unwrap().contains("spline"));
    }

    #[test]
    fn test_core_classification() {
        let e = PipelineError::from_job(
            "pm25/2024-01-01",
            None,
            cheaqi_core::Error::InsufficientData { required: 5, found: 3 },
        );
        assert_eq!(e.kind(), ErrorKind::InsufficientData);
        assert_eq!(e.identifier().as_deref(), Some("pm25/2024-01-01"));

        let e = PipelineError::from_job(
            "pm25/2024-01-01",
            None,
            cheaqi_core::Error::Algorithm("singular".into()),
        );
        assert_eq!(e.kind(), ErrorKind::InterpolationFailure);

        let e = PipelineError::from_io(
            std::path::Path::new("stack.tif"),
            cheaqi_core::Error::SizeMismatch { band: 2, er: 1, ec: 1, ar: 2, ac: 2 },
        );
        assert_eq!(e.kind(), ErrorKind::ShapeMismatch);
        assert_eq!(e.identifier().as_deref(), Some("stack.tif"));
    }

    #[test]
    fn test_every_abort_has_identifier() {
        let errors = [
            PipelineError::schema("latitude_wgs", "latitude column 'latitude_wgs' not found"),
            PipelineError::Schema {
                message: "no header".into(),
                identifier: None,
            }
            .or_identifier("data.csv"),
            PipelineError::InvalidConfig {
                setting: "jobs".into(),
                message: "jobs must be >= 1".into(),
            },
        ];
        let expected = ["latitude_wgs", "data.csv", "jobs"];
        for (err, id) in errors.iter().zip(expected) {
            let json = serde_json::to_value(err.to_structured()).unwrap();
            assert_eq!(json["kind"], "schema_error");
            assert_eq!(json["identifier"], id);
        }

        // An identifier already present is kept
        let kept = PipelineError::schema("pm25", "x").or_identifier("data.csv");
        assert_eq!(kept.identifier().as_deref(), Some("pm25"));
    }
}
