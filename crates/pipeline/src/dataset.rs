//! Cleaned sample set extracted from a table
//!
//! A [`Dataset`] is an immutable view over shared samples. Filtering by
//! variable or date yields another view over the same storage, so the
//! original is never touched.

use cheaqi_algorithms::interpolation::SamplePoint;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

use crate::dates::parse_date;
use crate::error::{PipelineError, Result};
use crate::table::Table;

/// One table row with usable coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub lat: f64,
    pub lon: f64,
    pub date: Option<NaiveDate>,
    /// Values in [`Dataset::variables`] order
    pub values: Vec<Option<f64>>,
}

/// Which table columns feed the dataset
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSelection {
    pub lat: String,
    pub lon: String,
    pub date: Option<String>,
    pub variables: Vec<String>,
}

/// Row accounting from [`Dataset::from_table`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadStats {
    pub total_rows: usize,
    pub kept_rows: usize,
    /// Rows dropped for a missing or non-finite coordinate
    pub dropped_no_coordinates: usize,
    /// Kept rows whose date was missing or unparseable
    pub undated_rows: usize,
}

/// Summary of one variable's observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableStats {
    pub data_points: usize,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub distinct_dates: usize,
    pub lat_range: (f64, f64),
    pub lon_range: (f64, f64),
    pub mean: f64,
    /// Sample standard deviation (n - 1); 0 for a single observation
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    variables: Arc<[String]>,
    samples: Arc<[Sample]>,
    /// Indices into `samples` visible through this view
    rows: Arc<[usize]>,
}

fn numeric_column<'a>(table: &'a Table, name: &str, role: &str) -> Result<&'a [Option<f64>]> {
    let column = table
        .column(name)
        .ok_or_else(|| PipelineError::schema(name, format!("{} column '{}' not found", role, name)))?;
    column
        .numeric()
        .ok_or_else(|| PipelineError::schema(name, format!("{} column '{}' is not numeric", role, name)))
}

impl Dataset {
    /// Extract samples from `table`.
    ///
    /// Rows without finite coordinates are dropped. Rows whose date does not
    /// parse are kept but carry no date.
    pub fn from_table(table: &Table, selection: &ColumnSelection) -> Result<(Self, LoadStats)> {
        let lat = numeric_column(table, &selection.lat, "latitude")?;
        let lon = numeric_column(table, &selection.lon, "longitude")?;
        let values: Vec<&[Option<f64>]> = selection
            .variables
            .iter()
            .map(|v| numeric_column(table, v, "variable"))
            .collect::<Result<_>>()?;
        let dates = match &selection.date {
            Some(name) => Some(
                table
                    .column(name)
                    .ok_or_else(|| {
                        PipelineError::schema(name, format!("date column '{}' not found", name))
                    })?
                    .text(),
            ),
            None => None,
        };

        let mut stats = LoadStats {
            total_rows: table.n_rows(),
            ..Default::default()
        };
        let mut samples = Vec::with_capacity(table.n_rows());
        for row in 0..table.n_rows() {
            let (Some(y), Some(x)) = (lat[row], lon[row]) else {
                stats.dropped_no_coordinates += 1;
                continue;
            };
            if !(x.is_finite() && y.is_finite()) {
                stats.dropped_no_coordinates += 1;
                continue;
            }

            let date = dates
                .and_then(|d| d[row].as_deref())
                .and_then(parse_date);
            if date.is_none() {
                stats.undated_rows += 1;
            }

            samples.push(Sample {
                lat: y,
                lon: x,
                date,
                values: values
                    .iter()
                    .map(|col| col[row].filter(|v| v.is_finite()))
                    .collect(),
            });
        }
        stats.kept_rows = samples.len();

        if stats.dropped_no_coordinates > 0 {
            warn!(
                "dropped {} of {} rows without coordinates",
                stats.dropped_no_coordinates, stats.total_rows
            );
        }
        if selection.date.is_some() && stats.undated_rows > 0 {
            warn!("{} rows have no parseable date", stats.undated_rows);
        }

        let rows: Arc<[usize]> = (0..samples.len()).collect();
        Ok((
            Self {
                variables: selection.variables.clone().into(),
                samples: samples.into(),
                rows,
            },
            stats,
        ))
    }

    /// Build a dataset directly from samples
    pub fn from_samples(variables: Vec<String>, samples: Vec<Sample>) -> Self {
        let rows: Arc<[usize]> = (0..samples.len()).collect();
        Self {
            variables: variables.into(),
            samples: samples.into(),
            rows,
        }
    }

    fn view(&self, rows: Vec<usize>) -> Self {
        Self {
            variables: Arc::clone(&self.variables),
            samples: Arc::clone(&self.samples),
            rows: rows.into(),
        }
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.rows.iter().map(move |&i| &self.samples[i])
    }

    /// Rows with a value for variable `var`
    pub fn with_value(&self, var: usize) -> Self {
        self.view(
            self.rows
                .iter()
                .copied()
                .filter(|&i| self.samples[i].values.get(var).copied().flatten().is_some())
                .collect(),
        )
    }

    /// Rows with a value for at least one variable
    pub fn with_any_value(&self) -> Self {
        self.view(
            self.rows
                .iter()
                .copied()
                .filter(|&i| self.samples[i].values.iter().any(Option::is_some))
                .collect(),
        )
    }

    /// Rows observed on `date`
    pub fn on_date(&self, date: NaiveDate) -> Self {
        self.view(
            self.rows
                .iter()
                .copied()
                .filter(|&i| self.samples[i].date == Some(date))
                .collect(),
        )
    }

    /// Distinct dates in this view, ascending
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.samples()
            .filter_map(|s| s.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn has_dates(&self) -> bool {
        self.samples().any(|s| s.date.is_some())
    }

    /// Interpolation points for variable `var` (x = longitude, y = latitude)
    pub fn points(&self, var: usize) -> Vec<SamplePoint> {
        self.samples()
            .filter_map(|s| {
                s.values
                    .get(var)
                    .copied()
                    .flatten()
                    .map(|v| SamplePoint::new(s.lon, s.lat, v))
            })
            .collect()
    }

    /// Locations of every row in the view (value unused)
    pub fn locations(&self) -> Vec<SamplePoint> {
        self.samples()
            .map(|s| SamplePoint::new(s.lon, s.lat, 0.0))
            .collect()
    }

    /// Statistics for variable `var`, `None` without observations
    pub fn variable_stats(&self, var: usize) -> Option<VariableStats> {
        let observed: Vec<&Sample> = self
            .samples()
            .filter(|s| s.values.get(var).copied().flatten().is_some())
            .collect();
        if observed.is_empty() {
            return None;
        }

        let mut values: Vec<f64> = observed.iter().filter_map(|s| s.values[var]).collect();
        values.sort_by(f64::total_cmp);
        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let std = if n > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        let median = if n % 2 == 1 {
            values[n / 2]
        } else {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        };

        let range = |f: fn(&Sample) -> f64| {
            observed
                .iter()
                .map(|s| f(s))
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
        };
        let dates: BTreeSet<NaiveDate> = observed.iter().filter_map(|s| s.date).collect();

        Some(VariableStats {
            data_points: n,
            date_range: dates.first().zip(dates.last()).map(|(a, b)| (*a, *b)),
            distinct_dates: dates.len(),
            lat_range: range(|s| s.lat),
            lon_range: range(|s| s.lon),
            mean,
            std,
            min: values[0],
            max: values[n - 1],
            median,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn table() -> Table {
        let text = "\
date,lat,lon,pm25,no2
01/02/2024,0.1,32.1,10,1
01/02/2024,0.2,32.2,,2
02/02/2024,0.3,32.3,30,3
bad,0.4,32.4,40,4
02/02/2024,,32.5,50,5
";
        Table::from_reader(text.as_bytes(), b',', Path::new("t.csv")).unwrap()
    }

    fn selection() -> ColumnSelection {
        ColumnSelection {
            lat: "lat".into(),
            lon: "lon".into(),
            date: Some("date".into()),
            variables: vec!["pm25".into(), "no2".into()],
        }
    }

    #[test]
    fn test_from_table_accounting() {
        let (ds, stats) = Dataset::from_table(&table(), &selection()).unwrap();
        assert_eq!(stats.total_rows, 5);
        assert_eq!(stats.kept_rows, 4);
        assert_eq!(stats.dropped_no_coordinates, 1);
        assert_eq!(stats.undated_rows, 1);
        assert_eq!(ds.len(), 4);
    }

    #[test]
    fn test_views_share_storage_and_leave_original() {
        let (ds, _) = Dataset::from_table(&table(), &selection()).unwrap();
        let pm = ds.with_value(0);
        let feb1 = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let day = pm.on_date(feb1);

        assert_eq!(pm.len(), 3);
        assert_eq!(day.len(), 1);
        assert_eq!(ds.len(), 4);
        assert_eq!(day.points(0), vec![SamplePoint::new(32.1, 0.1, 10.0)]);
        assert_eq!(
            ds.dates(),
            vec![feb1, NaiveDate::from_ymd_opt(2024, 2, 2).unwrap()]
        );
    }

    #[test]
    fn test_variable_stats() {
        let (ds, _) = Dataset::from_table(&table(), &selection()).unwrap();
        let s = ds.variable_stats(0).unwrap();
        assert_eq!(s.data_points, 3);
        assert_eq!(s.min, 10.0);
        assert_eq!(s.max, 40.0);
        assert_eq!(s.median, 30.0);
        assert_eq!(s.distinct_dates, 2);
        assert_eq!(s.lat_range, (0.1, 0.4));
    }

    #[test]
    fn test_text_variable_is_schema_error() {
        let mut sel = selection();
        sel.variables = vec!["date".into()];
        let err = Dataset::from_table(&table(), &sel).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
        assert_eq!(err.identifier().as_deref(), Some("date"));

        let mut sel = selection();
        sel.lat = "latitude_wgs".into();
        let err = Dataset::from_table(&table(), &sel).unwrap_err();
        assert_eq!(err.to_structured().identifier.as_deref(), Some("latitude_wgs"));
    }
}
