//! # CHEAQI Pipeline
//!
//! Turns a table of point samples into georeferenced rasters:
//!
//! - [`table`]: delimited-text loading and column statistics
//! - [`detect`]: coordinate, date and variable column detection
//! - [`dataset`]: cleaned samples with copy-on-write views
//! - [`orchestrator`]: jobs per (variable, date), geostacks and the run report
//!
//! [`Pipeline::run`] is the entry point; everything it writes appears
//! atomically.

pub mod config;
pub mod dataset;
pub mod dates;
pub mod detect;
pub mod error;
pub mod geostack;
pub mod job;
pub mod naming;
pub mod orchestrator;
pub mod report;
pub mod status;
pub mod table;

pub use config::{PipelineConfig, ResolvedConfig, TemporalMode};
pub use dataset::{ColumnSelection, Dataset, LoadStats, Sample, VariableStats};
pub use detect::{detect, detect_coordinates, CoordinateDetection, Detection};
pub use error::{ErrorKind, PipelineError, Result, StructuredError};
pub use geostack::{assemble, Catalog, CatalogEntry, StackInput};
pub use orchestrator::Pipeline;
pub use report::{JobRecord, JobStatus, RunReport, RunStatus};
pub use status::{RunPhase, RunSnapshot, StatusBoard};
pub use table::{Column, ColumnSummary, ColumnType, Table};
