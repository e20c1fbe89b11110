//! Pipeline orchestrator
//!
//! `Loaded -> Detecting -> Running{Gridding -> Interpolating -> Encoding}
//! -> Assembling -> Reported`, or `TimedOut` when the wall-clock limit
//! expires while jobs are running.

use cheaqi_algorithms::interpolation::{build_grid, SamplePoint};
use crossbeam_channel::RecvTimeoutError;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::{PipelineConfig, TemporalMode};
use crate::dataset::{ColumnSelection, Dataset};
use crate::detect::{detect, CoordinateDetection, Detection};
use crate::error::{PipelineError, Result};
use crate::geostack::{assemble, StackInput};
use crate::job::{Job, JobContext};
use crate::naming::{catalog_path, job_key, name_collision, sanitize, OutputNames};
use crate::report::{
    GeostackRecord, GridInfo, JobRecord, ReportBuilder, RunHeader, RunReport, RunStatus,
    VariableSummary,
};
use crate::status::{RunPhase, StatusBoard};
use crate::table::Table;

/// Entry point for external callers: one configuration, any number of runs
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    status: Arc<StatusBoard>,
}

fn new_run_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Schema error whose identifier is filled in by the caller
fn unnamed_schema(message: impl Into<String>) -> PipelineError {
    PipelineError::Schema {
        message: message.into(),
        identifier: None,
    }
}

/// Column roles after applying configured overrides to detection
fn select_columns(config: &PipelineConfig, detection: &Detection) -> Result<ColumnSelection> {
    let found = detection.coordinates.found();
    let not_found = || match &detection.coordinates {
        CoordinateDetection::NotFound { reason } => reason.clone(),
        CoordinateDetection::Found(_) => String::new(),
    };

    let lat = match (&config.lat_column, found) {
        (Some(name), _) => name.clone(),
        (None, Some(c)) => c.lat.clone(),
        (None, None) => return Err(unnamed_schema(not_found())),
    };
    let lon = match (&config.lon_column, found) {
        (Some(name), _) => name.clone(),
        (None, Some(c)) => c.lon.clone(),
        (None, None) => return Err(unnamed_schema(not_found())),
    };
    if lat == lon {
        return Err(PipelineError::schema(
            lat.as_str(),
            format!("latitude and longitude resolve to the same column '{}'", lat),
        ));
    }
    let date = config.date_column.clone().or_else(|| detection.date_column.clone());

    let variables: Vec<String> = if config.variables.is_empty() {
        detection
            .variables
            .iter()
            .filter(|v| **v != lat && **v != lon && Some(*v) != date.as_ref())
            .cloned()
            .collect()
    } else {
        config.variables.clone()
    };
    if variables.is_empty() {
        return Err(unnamed_schema("no numeric column is suitable for interpolation"));
    }
    if let Some((first, second)) = name_collision(&variables) {
        return Err(PipelineError::schema(
            format!("{}, {}", first, second),
            format!(
                "variables '{}' and '{}' map to the same output name '{}'",
                first,
                second,
                sanitize(first)
            ),
        ));
    }

    Ok(ColumnSelection {
        lat,
        lon,
        date,
        variables,
    })
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            status: Arc::new(StatusBoard::new()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Live status of the current or last run
    pub fn status(&self) -> Arc<StatusBoard> {
        Arc::clone(&self.status)
    }

    /// Run the whole pipeline on `input`, writing every artifact into
    /// `output_dir`.
    ///
    /// Job failures are recorded in the returned report. Structural errors
    /// abort the run and no report is written. On timeout the report is
    /// written with status `timed_out` and no geostack is assembled.
    pub fn run(&self, input: &Path, output_dir: &Path) -> Result<RunReport> {
        let started = Instant::now();
        let started_at = chrono::Utc::now();
        let config = &self.config;
        let resolved = config.resolve()?;

        let table = Table::load(input, resolved.delimiter)?;
        self.status.set_phase(RunPhase::Loaded);
        info!(
            "loaded {} rows, {} columns from {}",
            table.n_rows(),
            table.columns().len(),
            input.display()
        );

        self.status.set_phase(RunPhase::Detecting);
        let detection = detect(&table);
        let selection = select_columns(config, &detection)
            .map_err(|e| e.or_identifier(input.display().to_string()))?;
        let (dataset, load) = Dataset::from_table(&table, &selection)?;
        info!(
            "coordinates ({}, {}), date column {:?}, variables {:?}",
            selection.lat, selection.lon, selection.date, selection.variables
        );

        let mode = match config.temporal_mode {
            TemporalMode::Auto if dataset.has_dates() => TemporalMode::Daily,
            TemporalMode::Auto => TemporalMode::Aggregate,
            TemporalMode::Daily if !dataset.has_dates() => {
                return Err(match &selection.date {
                    Some(name) => PipelineError::schema(
                        name.as_str(),
                        format!("daily mode: no parseable dates in column '{}'", name),
                    ),
                    None => PipelineError::schema(
                        input.display().to_string(),
                        "daily mode needs a date column",
                    ),
                });
            }
            other => other,
        };

        let run_id = config.run_id.clone().unwrap_or_else(new_run_id);
        let names = OutputNames::for_input(input, config.output_prefix.as_deref(), &run_id);
        std::fs::create_dir_all(output_dir).map_err(|e| PipelineError::Io {
            path: output_dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let report = Arc::new(ReportBuilder::new());
        let mut warnings = Vec::new();

        // Grid points: one set for the run, or one per variable
        let shared_points: Arc<Vec<SamplePoint>> =
            Arc::new(dataset.with_any_value().locations());

        let mut jobs = Vec::new();
        let mut variables = Vec::with_capacity(selection.variables.len());
        for (v, name) in selection.variables.iter().enumerate() {
            let observed = dataset.with_value(v);
            let grid_points = if config.shared_grid {
                Arc::clone(&shared_points)
            } else {
                Arc::new(observed.locations())
            };
            let grid = build_grid(&grid_points, &resolved.grid).ok().map(|g| GridInfo {
                width: g.width(),
                height: g.height(),
                bounds: g.bounds(),
            });
            variables.push(VariableSummary::new(name.clone(), observed.variable_stats(v), grid));

            if observed.len() < config.min_points {
                let err = PipelineError::InsufficientData {
                    job: name.clone(),
                    required: config.min_points,
                    found: observed.len(),
                };
                warn!("{}", err);
                report.record(JobRecord::pending(name.clone(), name.clone(), None, observed.len()).fail(&err));
                continue;
            }

            match mode {
                TemporalMode::Daily => {
                    let mut dates = observed.dates();
                    if let Some(cap) = config.max_days_per_variable {
                        dates.truncate(cap);
                    }
                    for date in dates {
                        let key = job_key(name, Some(date));
                        let points = observed.on_date(date).points(v);
                        if points.len() < config.daily_min_points {
                            let err = PipelineError::InsufficientData {
                                job: key.clone(),
                                required: config.daily_min_points,
                                found: points.len(),
                            };
                            warn!("{}", err);
                            report.record(
                                JobRecord::pending(key, name.clone(), Some(date), points.len()).fail(&err),
                            );
                            continue;
                        }
                        jobs.push(Job {
                            key,
                            variable: name.clone(),
                            date: Some(date),
                            points,
                            grid_points: Arc::clone(&grid_points),
                        });
                    }
                }
                _ => jobs.push(Job {
                    key: job_key(name, None),
                    variable: name.clone(),
                    date: None,
                    points: observed.points(v),
                    grid_points,
                }),
            }
        }

        for job in &jobs {
            report.plan(job.record());
        }
        info!(
            "{} jobs planned with {} ({:?} mode, {} workers)",
            jobs.len(),
            resolved.method.kind(),
            mode,
            config.jobs
        );

        self.status.update(|s| {
            s.phase = RunPhase::Running;
            s.jobs_total = jobs.len();
            s.jobs_done = 0;
            s.jobs_failed = 0;
            s.active.clear();
        });

        let cancel = Arc::new(AtomicBool::new(false));
        let context = Arc::new(JobContext {
            method: resolved.method.clone(),
            grid: resolved.grid.clone(),
            crs: resolved.crs.clone(),
            names: names.clone(),
            output_dir: output_dir.to_path_buf(),
            write_variance: config.write_variance,
            report: Arc::clone(&report),
            status: Arc::clone(&self.status),
            cancel: Arc::clone(&cancel),
        });

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs)
            .thread_name(|i| format!("cheaqi-job-{}", i))
            .build()
            .map_err(|e| PipelineError::InvalidConfig {
                setting: "jobs".into(),
                message: format!("cannot start workers: {}", e),
            })?;

        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let worker_ctx = Arc::clone(&context);
        std::thread::spawn(move || {
            pool.install(|| jobs.par_iter().for_each(|job| worker_ctx.run(job)));
            let _ = done_tx.send(());
        });

        let timed_out = match config.timeout_secs {
            Some(secs) => {
                let remaining = Duration::from_secs(secs).saturating_sub(started.elapsed());
                matches!(done_rx.recv_timeout(remaining), Err(RecvTimeoutError::Timeout))
            }
            None => {
                let _ = done_rx.recv();
                false
            }
        };

        let header = RunHeader {
            run_id: names.run_id().to_string(),
            input: input.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            method: resolved.method.kind().to_string(),
            temporal_mode: mode,
            crs: resolved.crs.identifier(),
            lat_column: selection.lat.clone(),
            lon_column: selection.lon.clone(),
            date_column: selection.date.clone(),
            load,
            started_at,
        };
        let report_path = output_dir.join(names.report());

        if timed_out {
            cancel.store(true, Ordering::Relaxed);
            let secs = config.timeout_secs.unwrap_or_default();
            warn!("run timed out after {} s, skipping assembly", secs);
            warnings.push(format!("timed out after {} s; geostack assembly skipped", secs));
            self.status.set_phase(RunPhase::TimedOut);

            let final_report = report.finalize(
                header,
                RunStatus::TimedOut,
                config.timeout_secs,
                variables,
                Vec::new(),
                warnings,
            );
            final_report.write(&report_path)?;
            return Ok(final_report);
        }

        self.status.set_phase(RunPhase::Assembling);
        let geostacks = self.assemble_stacks(&selection.variables, mode, &names, output_dir, &report, &mut warnings)?;

        let final_report = report.finalize(
            header,
            RunStatus::Completed,
            config.timeout_secs,
            variables,
            geostacks,
            warnings,
        );
        final_report.write(&report_path)?;
        self.status.set_phase(RunPhase::Reported);
        info!(
            "run {} finished: {}/{} jobs succeeded, report {}",
            final_report.header.run_id,
            final_report.counts.succeeded,
            final_report.counts.total,
            report_path.display()
        );
        Ok(final_report)
    }

    /// Per-variable stacks for daily runs, then the all-variables stack.
    /// Bands follow configured variable order, then date ascending.
    fn assemble_stacks(
        &self,
        variable_order: &[String],
        mode: TemporalMode,
        names: &OutputNames,
        output_dir: &Path,
        report: &ReportBuilder,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<GeostackRecord>> {
        let mut records = Vec::new();
        let mut combined = Vec::new();
        let mut contributing = 0;

        for variable in variable_order {
            let inputs: Vec<StackInput> = report
                .outputs_for(variable)
                .into_iter()
                .map(|(date, path)| StackInput {
                    path,
                    variable: variable.clone(),
                    date,
                })
                .collect();
            if inputs.is_empty() {
                continue;
            }
            contributing += 1;

            if mode == TemporalMode::Daily {
                let path = output_dir.join(names.variable_geostack(variable));
                let (path, catalog) = assemble(&inputs, &path, Some(names.run_id()))?;
                records.push(GeostackRecord {
                    variable: Some(variable.clone()),
                    catalog: catalog_path(&path),
                    path,
                    band_count: catalog.band_count,
                });
            }
            combined.extend(inputs);
        }

        if !self.config.combined_geostack || combined.is_empty() {
            return Ok(records);
        }
        if !self.config.shared_grid && contributing > 1 {
            let msg = "combined geostack skipped: variables use separate grids".to_string();
            warn!("{}", msg);
            warnings.push(msg);
            return Ok(records);
        }

        let path: PathBuf = output_dir.join(names.combined_geostack());
        let (path, catalog) = assemble(&combined, &path, Some(names.run_id()))?;
        records.push(GeostackRecord {
            variable: None,
            catalog: catalog_path(&path),
            path,
            band_count: catalog.band_count,
        });
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(text: &str) -> Table {
        Table::from_reader(text.as_bytes(), b',', Path::new("t.csv")).unwrap()
    }

    #[test]
    fn test_select_columns_overrides_and_exclusions() {
        let mut text = String::from("date,lat,lon,pm25,no2\n");
        for i in 0..12 {
            text.push_str(&format!("2024-01-01,{},{},{},{}\n", 0.1 * i as f64, 32.0 + 0.1 * i as f64, i, i * 2));
        }
        let t = table(&text);
        let d = detect(&t);

        let sel = select_columns(&PipelineConfig::default(), &d).unwrap();
        assert_eq!(sel.lat, "lat");
        assert_eq!(sel.date.as_deref(), Some("date"));
        assert_eq!(sel.variables, vec!["pm25", "no2"]);

        let config = PipelineConfig {
            variables: vec!["no2".into()],
            ..Default::default()
        };
        assert_eq!(select_columns(&config, &d).unwrap().variables, vec!["no2"]);
    }

    #[test]
    fn test_no_coordinates_is_schema_error() {
        let mut text = String::from("station,reading\n");
        for i in 0..12 {
            text.push_str(&format!("s{},{}\n", i, 1000 + i));
        }
        let d = detect(&table(&text));
        let err = select_columns(&PipelineConfig::default(), &d).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
        // Filled in with the input path by the run
        assert_eq!(err.or_identifier("t.csv").identifier().as_deref(), Some("t.csv"));
    }

    #[test]
    fn test_colliding_variable_names_are_rejected() {
        let mut text = String::from("lat,lon,pm2.5,pm2_5\n");
        for i in 0..12 {
            text.push_str(&format!(
                "{},{},{},{}\n",
                0.1 * i as f64,
                32.0 + 0.1 * i as f64,
                1.5 * i as f64,
                100 + i
            ));
        }
        let d = detect(&table(&text));
        let err = select_columns(&PipelineConfig::default(), &d).unwrap_err();

        assert!(matches!(err, PipelineError::Schema { .. }));
        assert_eq!(err.identifier().as_deref(), Some("pm2.5, pm2_5"));
        assert!(err.to_string().contains("pm2-5"));
    }

    #[test]
    fn test_run_id_shape() {
        let id = new_run_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
