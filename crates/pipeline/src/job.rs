//! Per-job work: grid, interpolate, encode
//!
//! A job owns its sample subset; the grid is rebuilt from the job's grid
//! points, which are shared by every job of a variable (or of the whole
//! run with a shared grid), so sibling rasters line up exactly.

use cheaqi_algorithms::interpolation::{
    build_grid, interpolate, GridSpec, InterpolationMethod, SamplePoint,
};
use cheaqi_core::io::write_geotiff;
use cheaqi_core::CRS;
use chrono::NaiveDate;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::naming::{band_description, OutputNames};
use crate::report::{JobRecord, JobStatus, ReportBuilder, VariogramSummary};
use crate::status::{JobPhase, StatusBoard};

/// One (variable, date) unit of work
#[derive(Debug, Clone)]
pub struct Job {
    pub key: String,
    pub variable: String,
    pub date: Option<NaiveDate>,
    pub points: Vec<SamplePoint>,
    /// Locations the grid is fitted to
    pub grid_points: Arc<Vec<SamplePoint>>,
}

impl Job {
    pub fn record(&self) -> JobRecord {
        JobRecord::pending(
            self.key.clone(),
            self.variable.clone(),
            self.date,
            self.points.len(),
        )
    }
}

/// Everything a worker needs, shared read-only across the pool
#[derive(Debug)]
pub struct JobContext {
    pub method: InterpolationMethod,
    pub grid: GridSpec,
    pub crs: CRS,
    pub names: OutputNames,
    pub output_dir: PathBuf,
    pub write_variance: bool,
    pub report: Arc<ReportBuilder>,
    pub status: Arc<StatusBoard>,
    /// Set when the run is abandoned; nothing is written or recorded after
    pub cancel: Arc<AtomicBool>,
}

struct Outcome {
    output: PathBuf,
    variance_output: Option<PathBuf>,
    value_range: Option<(f64, f64)>,
    variance_range: Option<(f64, f64)>,
    variogram: Option<VariogramSummary>,
}

fn finite_range(data: &Array2<f64>) -> Option<(f64, f64)> {
    data.iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Remove rasters a job wrote after its run was abandoned
fn discard<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) {
    for path in paths {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("cannot remove abandoned {}: {}", path.display(), e);
        }
    }
}

impl JobContext {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Run `job` and record its outcome. Failures stay local to the job.
    pub fn run(&self, job: &Job) {
        if self.cancelled() {
            return;
        }
        let start = Instant::now();
        let mut record = job.record();

        let result = self.execute(job);
        if self.cancelled() {
            if let Ok(Some(outcome)) = &result {
                discard(std::iter::once(&outcome.output).chain(outcome.variance_output.as_ref()));
            }
            debug!("{}: abandoned", job.key);
            return;
        }

        match result {
            Ok(None) => return,
            Ok(Some(outcome)) => {
                record.status = JobStatus::Succeeded;
                record.output = Some(outcome.output);
                record.variance_output = outcome.variance_output;
                record.value_range = outcome.value_range;
                record.variance_range = outcome.variance_range;
                record.variogram = outcome.variogram;
                debug!("{}: done in {:.2?}", job.key, start.elapsed());
            }
            Err(e) => {
                warn!("{}: {}", job.key, e);
                record = record.fail(&e);
            }
        }
        record.elapsed_ms = start.elapsed().as_millis() as u64;

        let failed = record.status != JobStatus::Succeeded;
        let written: Vec<PathBuf> = record
            .output
            .iter()
            .chain(record.variance_output.iter())
            .cloned()
            .collect();
        if self.report.record(record) {
            self.status.job_finished(&job.key, failed);
        } else {
            // The report was sealed while this job ran
            discard(&written);
        }
    }

    /// `Ok(None)` when the run was cancelled before anything was written
    fn execute(&self, job: &Job) -> Result<Option<Outcome>> {
        let fail = |path: Option<&Path>, e| PipelineError::from_job(&job.key, path, e);

        self.status.job_phase(&job.key, JobPhase::Gridding);
        let grid = build_grid(&job.grid_points, &self.grid).map_err(|e| fail(None, e))?;

        self.status.job_phase(&job.key, JobPhase::Interpolating);
        debug!(
            "{}: {} points on {}x{} grid",
            job.key,
            job.points.len(),
            grid.width(),
            grid.height()
        );
        let surface = interpolate(&job.points, &grid, &self.method).map_err(|e| fail(None, e))?;

        if self.cancelled() {
            return Ok(None);
        }
        self.status.job_phase(&job.key, JobPhase::Encoding);
        let description = band_description(&job.variable, job.date);
        let output = self.output_dir.join(self.names.band(&job.variable, job.date));
        let raster = surface.to_raster(&grid, &self.crs, description.clone());
        write_geotiff(&raster, &output, None).map_err(|e| fail(Some(&output), e))?;

        let mut variance_output = None;
        if self.write_variance {
            if let Some(variance) =
                surface.variance_raster(&grid, &self.crs, format!("{} variance", description))
            {
                let path = self.output_dir.join(self.names.variance(&job.variable, job.date));
                write_geotiff(&variance, &path, None).map_err(|e| fail(Some(&path), e))?;
                variance_output = Some(path);
            }
        }

        Ok(Some(Outcome {
            output,
            variance_output,
            value_range: surface.value_range(),
            variance_range: surface.variance.as_ref().and_then(finite_range),
            variogram: surface.variogram.as_ref().map(VariogramSummary::from),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cheaqi_algorithms::interpolation::{IdwParams, Resolution};
    use cheaqi_core::io::read_geotiff;
    use cheaqi_core::Raster;

    fn context(dir: &Path) -> JobContext {
        JobContext {
            method: InterpolationMethod::Idw(IdwParams::default()),
            grid: GridSpec {
                resolution: Resolution::Cells(20),
                ..Default::default()
            },
            crs: CRS::wgs84(),
            names: OutputNames::new("t", "r1"),
            output_dir: dir.to_path_buf(),
            write_variance: false,
            report: Arc::new(ReportBuilder::new()),
            status: Arc::new(StatusBoard::new()),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    fn job(points: Vec<SamplePoint>) -> Job {
        Job {
            key: "pm25/2024-01-01".into(),
            variable: "pm25".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1),
            grid_points: Arc::new(points.clone()),
            points,
        }
    }

    #[test]
    fn test_successful_job_writes_band() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let points: Vec<_> = (0..6)
            .map(|i| SamplePoint::new(32.0 + i as f64 * 0.1, 0.5 + (i % 3) as f64 * 0.1, i as f64))
            .collect();

        ctx.run(&job(points));

        assert_eq!(ctx.report.recorded(), 1);
        let outputs = ctx.report.outputs_for("pm25");
        let raster: Raster<f32> = read_geotiff(&outputs[0].1).unwrap();
        assert_eq!(raster.shape(), (20, 20));
        assert_eq!(raster.description(), Some("pm25 - 2024-01-01"));
        assert_eq!(ctx.status.latest().jobs_done, 1);
    }

    #[test]
    fn test_single_point_job_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        ctx.run(&job(vec![SamplePoint::new(32.0, 0.5, 1.0)]));

        assert!(ctx.report.outputs_for("pm25").is_empty());
        assert_eq!(ctx.status.latest().jobs_failed, 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_cancelled_job_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        ctx.cancel.store(true, Ordering::Relaxed);
        ctx.run(&job(vec![SamplePoint::new(32.0, 0.5, 1.0), SamplePoint::new(32.1, 0.6, 2.0)]));
        assert_eq!(ctx.report.recorded(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_job_finishing_after_seal_leaves_no_raster() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let header = crate::report::RunHeader {
            run_id: "r1".into(),
            input: "in.csv".into(),
            output_dir: dir.path().to_path_buf(),
            method: "idw".into(),
            temporal_mode: crate::config::TemporalMode::Daily,
            crs: "EPSG:4326".into(),
            lat_column: "lat".into(),
            lon_column: "lon".into(),
            date_column: None,
            load: Default::default(),
            started_at: chrono::Utc::now(),
        };
        ctx.report.finalize(
            header,
            crate::report::RunStatus::TimedOut,
            Some(0),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        let points: Vec<_> = (0..6)
            .map(|i| SamplePoint::new(32.0 + i as f64 * 0.1, 0.5 + (i % 3) as f64 * 0.1, i as f64))
            .collect();

        ctx.run(&job(points));

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_abandoned_outputs_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("t_pm25_2024-01-01_r1.tif");
        let variance = dir.path().join("t_pm25_2024-01-01_r1_variance.tif");
        std::fs::write(&output, b"x").unwrap();
        std::fs::write(&variance, b"x").unwrap();

        discard([&output, &variance]);

        assert!(!output.exists());
        assert!(!variance.exists());
    }
}
