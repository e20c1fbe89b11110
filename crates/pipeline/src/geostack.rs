//! Multi-band geostack assembly with a JSON band catalog
//!
//! Band order is exactly the input order. The catalog carries no
//! timestamps, so assembling the same inputs twice yields identical bytes.

use cheaqi_core::io::{check_band_profiles, read_geotiff, write_atomic, write_multiband_geotiff};
use cheaqi_core::{GeoTransform, Raster};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::dates::parse_date;
use crate::error::{PipelineError, Result};
use crate::naming::{band_description, catalog_path};

/// One single-band raster destined for a geostack
#[derive(Debug, Clone, PartialEq)]
pub struct StackInput {
    pub path: PathBuf,
    pub variable: String,
    pub date: Option<NaiveDate>,
}

impl StackInput {
    /// Provenance taken from the raster's band description, falling back to
    /// the file stem when the description does not follow `"<variable> - <date>"`.
    pub fn from_raster_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raster: Raster<f32> = read_geotiff(path).map_err(|e| PipelineError::from_io(path, e))?;
        let (variable, date) = match raster.description().and_then(provenance_from_description) {
            Some(p) => p,
            None => (
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                None,
            ),
        };
        Ok(Self {
            path: path.to_path_buf(),
            variable,
            date,
        })
    }
}

/// Split `"<variable> - <date>"`; `"<variable> - aggregate"` has no date
pub fn provenance_from_description(description: &str) -> Option<(String, Option<NaiveDate>)> {
    let (variable, tail) = description.rsplit_once(" - ")?;
    let variable = variable.trim();
    if variable.is_empty() {
        return None;
    }
    let tail = tail.trim();
    if tail == "aggregate" {
        return Some((variable.to_string(), None));
    }
    parse_date(tail).map(|d| (variable.to_string(), Some(d)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// 1-based band number in the geostack
    pub band: usize,
    pub variable: String,
    pub date: Option<NaiveDate>,
    /// File name of the source raster
    pub source: String,
    pub description: String,
}

/// Machine-readable description of a geostack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub geostack: String,
    pub run_id: Option<String>,
    pub crs: Option<String>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub band_count: usize,
    /// Distinct variables, sorted
    pub variables: Vec<String>,
    pub bands: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text)
            .map_err(|e| PipelineError::schema(path.display().to_string(), e.to_string()))
    }

    fn write(&self, path: &Path) -> Result<()> {
        write_atomic(path, |w| {
            serde_json::to_writer_pretty(&mut *w, self)
                .map_err(|e| cheaqi_core::Error::Other(e.to_string()))
        })
        .map_err(|e| PipelineError::from_io(path, e))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Stack `inputs` into one multi-band raster at `output` and write its
/// catalog next to it.
///
/// Every input must share the first input's shape, transform and CRS. On
/// mismatch nothing is written.
pub fn assemble(inputs: &[StackInput], output: &Path, run_id: Option<&str>) -> Result<(PathBuf, Catalog)> {
    if inputs.is_empty() {
        return Err(PipelineError::schema(
            output.display().to_string(),
            "no rasters to stack",
        ));
    }

    let bands: Vec<Raster<f32>> = inputs
        .iter()
        .map(|input| {
            let mut raster: Raster<f32> =
                read_geotiff(&input.path).map_err(|e| PipelineError::from_io(&input.path, e))?;
            if raster.description().is_none() {
                raster.set_description(Some(band_description(&input.variable, input.date)));
            }
            Ok(raster)
        })
        .collect::<Result<_>>()?;

    check_band_profiles(&bands).map_err(|e| PipelineError::from_io(output, e))?;
    write_multiband_geotiff(&bands, output).map_err(|e| PipelineError::from_io(output, e))?;

    let first = &bands[0];
    let mut variables: Vec<String> = inputs.iter().map(|i| i.variable.clone()).collect();
    variables.sort();
    variables.dedup();

    let catalog = Catalog {
        geostack: file_name(output),
        run_id: run_id.map(str::to_string),
        crs: first.crs().map(|c| c.identifier()),
        width: first.cols(),
        height: first.rows(),
        transform: *first.transform(),
        band_count: bands.len(),
        variables,
        bands: inputs
            .iter()
            .zip(&bands)
            .enumerate()
            .map(|(i, (input, raster))| CatalogEntry {
                band: i + 1,
                variable: input.variable.clone(),
                date: input.date,
                source: file_name(&input.path),
                description: raster
                    .description()
                    .map(str::to_string)
                    .unwrap_or_else(|| band_description(&input.variable, input.date)),
            })
            .collect(),
    };

    let catalog_file = catalog_path(output);
    catalog.write(&catalog_file)?;
    info!(
        "assembled {} bands into {}",
        catalog.band_count,
        output.display()
    );
    Ok((output.to_path_buf(), catalog))
}
