//! Coordinate, date and variable column detection
//!
//! Detection never fails: a missing coordinate pair is reported as
//! [`CoordinateDetection::NotFound`] with the reason, and the caller decides
//! whether that is fatal.

use serde::Serialize;

use crate::table::{Column, Table};

pub const LAT_PATTERNS: &[&str] = &["lat", "latitude", "y", "northing"];
pub const LON_PATTERNS: &[&str] = &["lon", "long", "longitude", "x", "easting", "lng"];
pub const DATE_PATTERNS: &[&str] = &["date", "time", "day", "month", "year"];

/// Minimum non-null count for a numeric column to be interpolated
pub const SUITABLE_MIN_COUNT: usize = 10;
/// Distinct values a numeric column must exceed to be interpolated
pub const SUITABLE_MIN_DISTINCT: usize = 5;

fn matches_any(name: &str, patterns: &[&str]) -> bool {
    let lower = name.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

/// How a coordinate column was identified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Name,
    ValueRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinateColumns {
    pub lat: String,
    pub lon: String,
    pub lat_matched_by: MatchKind,
    pub lon_matched_by: MatchKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CoordinateDetection {
    Found(CoordinateColumns),
    NotFound { reason: String },
}

impl CoordinateDetection {
    pub fn found(&self) -> Option<&CoordinateColumns> {
        match self {
            CoordinateDetection::Found(c) => Some(c),
            CoordinateDetection::NotFound { .. } => None,
        }
    }
}

/// Find the latitude/longitude pair.
///
/// Only numeric columns qualify. Name patterns (case-insensitive substring)
/// take priority, first matching column in table order wins, and a column
/// claimed as latitude is not considered for longitude. Without a name
/// match, the first numeric column within [-90, 90] (latitude) or
/// [-180, 180] (longitude) is used.
pub fn detect_coordinates(table: &Table) -> CoordinateDetection {
    let numeric: Vec<&Column> = table.columns().iter().filter(|c| c.is_numeric()).collect();

    let lat_by_name = numeric.iter().find(|c| matches_any(c.name(), LAT_PATTERNS));
    let lon_by_name = numeric.iter().find(|c| {
        Some(c.name()) != lat_by_name.map(|l| l.name()) && matches_any(c.name(), LON_PATTERNS)
    });

    let in_range = |c: &Column, limit: f64| {
        c.numeric_range()
            .is_some_and(|(lo, hi)| lo >= -limit && hi <= limit)
    };

    let (lat, lat_kind) = match lat_by_name {
        Some(c) => (Some(*c), MatchKind::Name),
        None => (
            numeric
                .iter()
                .find(|c| Some(c.name()) != lon_by_name.map(|l| l.name()) && in_range(c, 90.0))
                .copied(),
            MatchKind::ValueRange,
        ),
    };
    let (lon, lon_kind) = match lon_by_name {
        Some(c) => (Some(*c), MatchKind::Name),
        None => (
            numeric
                .iter()
                .find(|c| Some(c.name()) != lat.map(|l| l.name()) && in_range(c, 180.0))
                .copied(),
            MatchKind::ValueRange,
        ),
    };

    match (lat, lon) {
        (Some(lat), Some(lon)) => CoordinateDetection::Found(CoordinateColumns {
            lat: lat.name().to_string(),
            lon: lon.name().to_string(),
            lat_matched_by: lat_kind,
            lon_matched_by: lon_kind,
        }),
        (None, None) => CoordinateDetection::NotFound {
            reason: format!(
                "no numeric latitude or longitude column among {} numeric columns",
                numeric.len()
            ),
        },
        (None, Some(_)) => CoordinateDetection::NotFound {
            reason: "no numeric latitude column (name or [-90, 90] range)".into(),
        },
        (Some(_), None) => CoordinateDetection::NotFound {
            reason: "no numeric longitude column (name or [-180, 180] range)".into(),
        },
    }
}

/// Whether a column has enough distinct observations to interpolate
pub fn is_suitable(column: &Column) -> bool {
    column.is_numeric()
        && column.non_null_count() >= SUITABLE_MIN_COUNT
        && column.distinct_count() > SUITABLE_MIN_DISTINCT
}

/// Everything detection found in a table
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub coordinates: CoordinateDetection,
    /// Columns whose name suggests a date or time
    pub date_candidates: Vec<String>,
    /// First text-typed date candidate
    pub date_column: Option<String>,
    /// Numeric, non-coordinate columns suitable for interpolation
    pub variables: Vec<String>,
}

pub fn detect(table: &Table) -> Detection {
    let coordinates = detect_coordinates(table);

    let date_candidates: Vec<String> = table
        .column_names()
        .filter(|n| matches_any(n, DATE_PATTERNS))
        .map(str::to_string)
        .collect();
    let date_column = date_candidates
        .iter()
        .find(|n| table.column(n).is_some_and(|c| !c.is_numeric()))
        .cloned();

    let coord_names: Vec<&str> = coordinates
        .found()
        .map(|c| vec![c.lat.as_str(), c.lon.as_str()])
        .unwrap_or_default();
    let variables = table
        .columns()
        .iter()
        .filter(|c| !coord_names.contains(&c.name()) && is_suitable(c))
        .map(|c| c.name().to_string())
        .collect();

    Detection {
        coordinates,
        date_candidates,
        date_column,
        variables,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn table(text: &str) -> Table {
        Table::from_reader(text.as_bytes(), b',', Path::new("t.csv")).unwrap()
    }

    fn numbered_rows(header: &str, row: impl Fn(usize) -> String) -> Table {
        let mut text = format!("{}\n", header);
        for i in 0..12 {
            text.push_str(&row(i));
            text.push('\n');
        }
        table(&text)
    }

    #[test]
    fn test_name_patterns() {
        let t = numbered_rows("Date,Latitude,Longitude,PM25", |i| {
            format!("2024-01-0{},{},{},{}", i % 9 + 1, 0.1 * i as f64, 32.0 + 0.1 * i as f64, i)
        });
        let found = detect_coordinates(&t);
        let coords = found.found().unwrap();
        assert_eq!(coords.lat, "Latitude");
        assert_eq!(coords.lon, "Longitude");
        assert_eq!(coords.lat_matched_by, MatchKind::Name);
    }

    #[test]
    fn test_first_match_wins_and_lat_not_reused() {
        // "lat_lon" matches latitude first; longitude must come from another column
        let t = numbered_rows("lat_lon,x_coord,value", |i| format!("{},{},{}", i, i * 2, i * 3));
        let coords = detect_coordinates(&t);
        let coords = coords.found().unwrap();
        assert_eq!(coords.lat, "lat_lon");
        assert_eq!(coords.lon, "x_coord");
    }

    #[test]
    fn test_range_fallback() {
        let t = numbered_rows("a,b,c", |i| format!("{},{},{}", 1.0 + i as f64 * 0.1, 150.0 + i as f64, 500 + i));
        let coords = detect_coordinates(&t);
        let coords = coords.found().unwrap();
        assert_eq!(coords.lat, "a");
        assert_eq!(coords.lon, "b");
        assert_eq!(coords.lon_matched_by, MatchKind::ValueRange);
    }

    #[test]
    fn test_not_found_is_a_value() {
        let t = numbered_rows("station,reading", |i| format!("s{},{}", i, 1000 + i));
        match detect_coordinates(&t) {
            CoordinateDetection::NotFound { reason } => assert!(reason.contains("latitude")),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_variables_and_dates() {
        let t = numbered_rows("date,lat,lon,pm25,flag,sparse", |i| {
            let sparse = if i < 3 { i.to_string() } else { String::new() };
            format!("0{}/01/2024,{},{},{},{},{}", i % 9 + 1, 0.2 * i as f64, 30.0 + 0.3 * i as f64, 10 + i, i % 2, sparse)
        });
        let d = detect(&t);

        assert_eq!(d.date_candidates, vec!["date"]);
        assert_eq!(d.date_column.as_deref(), Some("date"));
        // flag has 2 distinct values, sparse has 3 non-null: neither qualifies
        assert_eq!(d.variables, vec!["pm25"]);
    }
}
