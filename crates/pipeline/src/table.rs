//! Delimited-text table loading and schema introspection
//!
//! A column is numeric when every non-missing token parses as a number.
//! Missing tokens are empty cells and the usual NA spellings.

use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Tokens treated as missing values
pub const MISSING_TOKENS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

fn is_missing(token: &str) -> bool {
    MISSING_TOKENS.contains(&token)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numeric,
    Text,
    /// Every cell missing
    Empty,
}

/// One column of the table, with text cells and (for numeric columns)
/// their parsed values.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    dtype: ColumnType,
    text: Vec<Option<String>>,
    numeric: Option<Vec<Option<f64>>>,
}

impl Column {
    fn from_cells(name: String, text: Vec<Option<String>>) -> Self {
        let mut any = false;
        let mut parsed = Vec::with_capacity(text.len());
        let mut numeric = true;
        for cell in &text {
            match cell {
                None => parsed.push(None),
                Some(t) => {
                    any = true;
                    match t.parse::<f64>() {
                        Ok(v) => parsed.push(Some(v)),
                        Err(_) => {
                            numeric = false;
                            break;
                        }
                    }
                }
            }
        }

        let (dtype, numeric) = if !any {
            (ColumnType::Empty, None)
        } else if numeric {
            (ColumnType::Numeric, Some(parsed))
        } else {
            (ColumnType::Text, None)
        };

        Self {
            name,
            dtype,
            text,
            numeric,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> ColumnType {
        self.dtype
    }

    pub fn is_numeric(&self) -> bool {
        self.dtype == ColumnType::Numeric
    }

    pub fn text(&self) -> &[Option<String>] {
        &self.text
    }

    /// Parsed values, `None` for text columns
    pub fn numeric(&self) -> Option<&[Option<f64>]> {
        self.numeric.as_deref()
    }

    pub fn non_null_count(&self) -> usize {
        self.text.iter().filter(|c| c.is_some()).count()
    }

    /// Number of distinct non-missing values
    pub fn distinct_count(&self) -> usize {
        match &self.numeric {
            Some(values) => values
                .iter()
                .flatten()
                .map(|v| (v + 0.0).to_bits())
                .collect::<HashSet<_>>()
                .len(),
            None => self.text.iter().flatten().collect::<HashSet<_>>().len(),
        }
    }

    /// (min, max) over the finite numeric values
    pub fn numeric_range(&self) -> Option<(f64, f64)> {
        self.numeric
            .as_ref()?
            .iter()
            .flatten()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Per-column summary, as shown by `inspect`
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub dtype: ColumnType,
    pub total_count: usize,
    pub non_null_count: usize,
    pub null_count: usize,
    pub null_percentage: f64,
    pub distinct_count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    /// Sample standard deviation (n - 1)
    pub std: Option<f64>,
    pub sample_values: Vec<String>,
}

/// A loaded, read-only table
#[derive(Debug, Clone)]
pub struct Table {
    source: PathBuf,
    delimiter: u8,
    columns: Vec<Column>,
    n_rows: usize,
}

/// Pick the delimiter that occurs most often in the header line
pub fn sniff_delimiter(header: &str) -> u8 {
    [b',', b';', b'\t']
        .into_iter()
        .map(|d| (d, header.bytes().filter(|b| *b == d).count()))
        .fold((b',', 0), |best, cur| if cur.1 > best.1 { cur } else { best })
        .0
}

impl Table {
    /// Load a delimited file. The delimiter is sniffed from the header line
    /// unless given.
    pub fn load<P: AsRef<Path>>(path: P, delimiter: Option<u8>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PipelineError::InputNotFound {
                path: path.to_path_buf(),
            });
        }
        let io_err = |e: std::io::Error| PipelineError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let delimiter = match delimiter {
            Some(d) => d,
            None => {
                let mut header = String::new();
                BufReader::new(File::open(path).map_err(io_err)?)
                    .read_line(&mut header)
                    .map_err(io_err)?;
                sniff_delimiter(&header)
            }
        };

        let file = File::open(path).map_err(io_err)?;
        Self::from_reader(file, delimiter, path)
    }

    /// Parse a table from any reader; `source` is only used for reporting.
    pub fn from_reader<R: Read>(reader: R, delimiter: u8, source: &Path) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| PipelineError::schema(source.display().to_string(), format!("unreadable header: {}", e)))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(PipelineError::schema(source.display().to_string(), "table has no header row"));
        }
        let mut seen = HashSet::new();
        for h in &headers {
            if h.is_empty() {
                return Err(PipelineError::schema(source.display().to_string(), "empty column name in header"));
            }
            if !seen.insert(h.as_str()) {
                return Err(PipelineError::schema(h.as_str(), format!("duplicate column name '{}'", h)));
            }
        }

        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
        let mut n_rows = 0;
        for (i, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| {
                PipelineError::schema(
                    source.display().to_string(),
                    format!("malformed record {}: {}", i + 2, e),
                )
            })?;
            for (c, column) in cells.iter_mut().enumerate() {
                let cell = record.get(c).filter(|t| !is_missing(t)).map(str::to_string);
                column.push(cell);
            }
            n_rows += 1;
        }

        let columns: Vec<Column> = headers
            .into_iter()
            .zip(cells)
            .map(|(name, text)| Column::from_cells(name, text))
            .collect();

        debug!(
            "loaded {} rows x {} columns from {}",
            n_rows,
            columns.len(),
            source.display()
        );

        Ok(Self {
            source: source.to_path_buf(),
            delimiter,
            columns,
            n_rows,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column statistics for every column in table order
    pub fn describe(&self) -> Vec<ColumnSummary> {
        self.columns
            .iter()
            .map(|col| {
                let non_null = col.non_null_count();
                let null = self.n_rows - non_null;
                let mut summary = ColumnSummary {
                    name: col.name.clone(),
                    dtype: col.dtype,
                    total_count: self.n_rows,
                    non_null_count: non_null,
                    null_count: null,
                    null_percentage: if self.n_rows == 0 {
                        0.0
                    } else {
                        (null as f64 / self.n_rows as f64 * 10_000.0).round() / 100.0
                    },
                    distinct_count: col.distinct_count(),
                    min: None,
                    max: None,
                    mean: None,
                    std: None,
                    sample_values: col.text.iter().flatten().take(3).cloned().collect(),
                };

                if let Some(values) = col.numeric() {
                    let finite: Vec<f64> = values.iter().flatten().copied().filter(|v| v.is_finite()).collect();
                    if !finite.is_empty() {
                        let n = finite.len() as f64;
                        let mean = finite.iter().sum::<f64>() / n;
                        summary.mean = Some(mean);
                        summary.min = finite.iter().copied().reduce(f64::min);
                        summary.max = finite.iter().copied().reduce(f64::max);
                        if finite.len() > 1 {
                            let ss: f64 = finite.iter().map(|v| (v - mean).powi(2)).sum();
                            summary.std = Some((ss / (n - 1.0)).sqrt());
                        }
                    }
                }
                summary
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn parse(text: &str) -> Table {
        let delimiter = sniff_delimiter(text.lines().next().unwrap_or(""));
        Table::from_reader(text.as_bytes(), delimiter, Path::new("test.csv")).unwrap()
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("a,b,c"), b',');
        assert_eq!(sniff_delimiter("a;b;c"), b';');
        assert_eq!(sniff_delimiter("a\tb\tc"), b'\t');
        assert_eq!(sniff_delimiter("single"), b',');
    }

    #[test]
    fn test_type_inference_and_missing_tokens() {
        let table = parse("site;lat;pm25\nA;0.5;12\nB;NA;\nC;1.5;N/A\nD;2.0;14\n");

        assert_eq!(table.n_rows(), 4);
        assert_eq!(table.column("site").unwrap().dtype(), ColumnType::Text);
        let lat = table.column("lat").unwrap();
        assert!(lat.is_numeric());
        assert_eq!(lat.numeric().unwrap(), &[Some(0.5), None, Some(1.5), Some(2.0)]);
        assert_eq!(table.column("pm25").unwrap().non_null_count(), 2);
    }

    #[test]
    fn test_describe() {
        let table = parse("v,name\n1,a\n2,a\n3,b\n4,\n");
        let summary = table.describe();

        assert_eq!(summary[0].dtype, ColumnType::Numeric);
        assert_eq!(summary[0].distinct_count, 4);
        assert_relative_eq!(summary[0].mean.unwrap(), 2.5);
        assert_relative_eq!(summary[0].std.unwrap(), 1.2909944487358056, epsilon = 1e-12);
        assert_eq!(summary[1].null_count, 1);
        assert_relative_eq!(summary[1].null_percentage, 25.0);
        assert_eq!(summary[1].distinct_count, 2);
        assert_eq!(summary[1].sample_values, vec!["a", "a", "b"]);
    }

    #[test]
    fn test_duplicate_header_is_schema_error() {
        let err = Table::from_reader("a,a\n1,2\n".as_bytes(), b',', Path::new("x.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
        assert_eq!(err.identifier().as_deref(), Some("a"));
    }

    #[test]
    fn test_missing_file() {
        let err = Table::load("/definitely/not/here.csv", None).unwrap_err();
        assert!(matches!(err, PipelineError::InputNotFound { .. }));
    }

    #[test]
    fn test_empty_column() {
        let table = parse("a,b\n1,\n2,NULL\n");
        assert_eq!(table.column("b").unwrap().dtype(), ColumnType::Empty);
    }
}
