//! Run report accumulation and persistence
//!
//! Workers append [`JobRecord`]s to a shared [`ReportBuilder`]. Once the
//! builder is sealed further records are dropped, so a report finalized on
//! timeout never changes under a late worker.

use cheaqi_algorithms::interpolation::FittedVariogram;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::config::TemporalMode;
use crate::dataset::{LoadStats, VariableStats};
use crate::error::{PipelineError, Result, StructuredError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    /// Rejected before interpolation (too few points)
    Skipped,
    Failed,
    /// Still pending or in flight when the run timed out
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariogramSummary {
    pub model: String,
    pub nugget: f64,
    pub sill: f64,
    pub range: f64,
}

impl From<&FittedVariogram> for VariogramSummary {
    fn from(v: &FittedVariogram) -> Self {
        Self {
            model: v.model.to_string(),
            nugget: v.nugget,
            sill: v.sill,
            range: v.range,
        }
    }
}

/// Outcome of one (variable, date) job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub key: String,
    pub variable: String,
    pub date: Option<NaiveDate>,
    pub status: JobStatus,
    /// Samples available to the job
    pub points: usize,
    pub output: Option<PathBuf>,
    pub variance_output: Option<PathBuf>,
    pub value_range: Option<(f64, f64)>,
    pub variance_range: Option<(f64, f64)>,
    pub variogram: Option<VariogramSummary>,
    pub error: Option<StructuredError>,
    pub elapsed_ms: u64,
}

impl JobRecord {
    pub fn pending(key: String, variable: String, date: Option<NaiveDate>, points: usize) -> Self {
        Self {
            key,
            variable,
            date,
            status: JobStatus::NotAttempted,
            points,
            output: None,
            variance_output: None,
            value_range: None,
            variance_range: None,
            variogram: None,
            error: None,
            elapsed_ms: 0,
        }
    }

    /// Mark as failed, or skipped for insufficient data
    pub fn fail(mut self, err: &PipelineError) -> Self {
        self.status = match err {
            PipelineError::InsufficientData { .. } => JobStatus::Skipped,
            _ => JobStatus::Failed,
        };
        self.error = Some(err.to_structured());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridInfo {
    pub width: usize,
    pub height: usize,
    /// (min_x, min_y, max_x, max_y) of the buffered grid
    pub bounds: (f64, f64, f64, f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSummary {
    pub name: String,
    pub stats: Option<VariableStats>,
    pub grid: Option<GridInfo>,
    pub succeeded: usize,
    /// Failed and skipped jobs
    pub failed: usize,
    pub success_rate: f64,
    pub files: Vec<PathBuf>,
}

impl VariableSummary {
    pub fn new(name: impl Into<String>, stats: Option<VariableStats>, grid: Option<GridInfo>) -> Self {
        Self {
            name: name.into(),
            stats,
            grid,
            succeeded: 0,
            failed: 0,
            success_rate: 0.0,
            files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeostackRecord {
    /// `None` for the all-variables stack
    pub variable: Option<String>,
    pub path: PathBuf,
    pub catalog: PathBuf,
    pub band_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub total: usize,
    pub succeeded: usize,
    /// Failed plus skipped jobs
    pub failed: usize,
    pub skipped: usize,
    pub not_attempted: usize,
}

/// Fixed facts about a run, known before any job starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHeader {
    pub run_id: String,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub method: String,
    pub temporal_mode: TemporalMode,
    pub crs: String,
    pub lat_column: String,
    pub lon_column: String,
    pub date_column: Option<String>,
    pub load: LoadStats,
    pub started_at: DateTime<Utc>,
}

/// Final, immutable summary of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub header: RunHeader,
    pub status: RunStatus,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub counts: Counts,
    pub variables: Vec<VariableSummary>,
    pub jobs: Vec<JobRecord>,
    pub geostacks: Vec<GeostackRecord>,
    pub warnings: Vec<String>,
}

impl RunReport {
    /// Persist as pretty JSON; the file appears only once complete
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        cheaqi_core::io::write_atomic(path, |w| {
            serde_json::to_writer_pretty(&mut *w, self)
                .map_err(|e| cheaqi_core::Error::Other(e.to_string()))
        })
        .map_err(|e| PipelineError::from_io(path, e))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text)
            .map_err(|e| PipelineError::schema(path.display().to_string(), e.to_string()))
    }

    pub fn job(&self, key: &str) -> Option<&JobRecord> {
        self.jobs.iter().find(|j| j.key == key)
    }
}

#[derive(Debug, Default)]
struct Inner {
    planned: Vec<JobRecord>,
    recorded: Vec<JobRecord>,
    sealed: bool,
}

/// Lock-protected, append-only job log shared by workers
#[derive(Debug, Default)]
pub struct ReportBuilder {
    inner: Mutex<Inner>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job that will run; unrecorded plans end up `not_attempted`
    pub fn plan(&self, job: JobRecord) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.sealed {
            inner.planned.push(job);
        }
    }

    /// Append a job outcome. Returns `false` when the builder is sealed.
    pub fn record(&self, job: JobRecord) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.sealed {
            debug!("dropping late record for {}", job.key);
            return false;
        }
        inner.recorded.push(job);
        true
    }

    /// Number of recorded outcomes so far
    pub fn recorded(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recorded
            .len()
    }

    /// Successful outputs of `variable`, date ascending
    pub fn outputs_for(&self, variable: &str) -> Vec<(Option<NaiveDate>, PathBuf)> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut outputs: Vec<_> = inner
            .recorded
            .iter()
            .filter(|j| j.variable == variable && j.status == JobStatus::Succeeded)
            .filter_map(|j| j.output.clone().map(|p| (j.date, p)))
            .collect();
        outputs.sort_by(|a, b| a.0.cmp(&b.0));
        outputs
    }

    /// Seal the builder and produce the report.
    ///
    /// Jobs are ordered by key. Planned jobs with no recorded outcome become
    /// `not_attempted` with a timeout error when the run timed out.
    pub fn finalize(
        &self,
        header: RunHeader,
        status: RunStatus,
        timeout_secs: Option<u64>,
        mut variables: Vec<VariableSummary>,
        geostacks: Vec<GeostackRecord>,
        warnings: Vec<String>,
    ) -> RunReport {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.sealed = true;

        let mut jobs = inner.recorded.clone();
        for plan in &inner.planned {
            if !jobs.iter().any(|j| j.key == plan.key) {
                let mut job = plan.clone();
                if let Some(secs) = timeout_secs.filter(|_| status == RunStatus::TimedOut) {
                    job.error = Some(PipelineError::Timeout { secs }.to_structured());
                }
                jobs.push(job);
            }
        }
        jobs.sort_by(|a, b| a.key.cmp(&b.key));

        let mut counts = Counts {
            total: jobs.len(),
            ..Default::default()
        };
        for job in &jobs {
            match job.status {
                JobStatus::Succeeded => counts.succeeded += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Skipped => {
                    counts.skipped += 1;
                    counts.failed += 1;
                }
                JobStatus::NotAttempted => counts.not_attempted += 1,
            }
        }

        for var in &mut variables {
            let mine: Vec<&JobRecord> = jobs.iter().filter(|j| j.variable == var.name).collect();
            var.succeeded = mine.iter().filter(|j| j.status == JobStatus::Succeeded).count();
            var.failed = mine
                .iter()
                .filter(|j| matches!(j.status, JobStatus::Failed | JobStatus::Skipped))
                .count();
            let attempted = var.succeeded + var.failed;
            var.success_rate = if attempted == 0 {
                0.0
            } else {
                var.succeeded as f64 / attempted as f64
            };
            var.files = mine.iter().filter_map(|j| j.output.clone()).collect();
        }

        let finished_at = Utc::now();
        let elapsed_ms = (finished_at - header.started_at).num_milliseconds().max(0) as u64;
        RunReport {
            header,
            status,
            finished_at,
            elapsed_ms,
            counts,
            variables,
            jobs,
            geostacks,
            warnings,
        }
    }
}
