//! Deterministic output file names

use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::Path;

/// Replace every character outside `[A-Za-z0-9-]` with `-`
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// First pair of variables that would share output file names
pub fn name_collision(variables: &[String]) -> Option<(&str, &str)> {
    let mut seen: HashMap<String, &str> = HashMap::with_capacity(variables.len());
    for v in variables {
        if let Some(first) = seen.insert(sanitize(v), v) {
            return Some((first, v));
        }
    }
    None
}

/// Output naming for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    prefix: String,
    run_id: String,
}

impl OutputNames {
    pub fn new(prefix: &str, run_id: &str) -> Self {
        Self {
            prefix: sanitize(prefix),
            run_id: sanitize(run_id),
        }
    }

    /// Prefix from the configured value, or the input file stem
    pub fn for_input(input: &Path, prefix: Option<&str>, run_id: &str) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cheaqi".to_string());
        Self::new(prefix.unwrap_or(&stem), run_id)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Single-band raster of one job
    pub fn band(&self, variable: &str, date: Option<NaiveDate>) -> String {
        match date {
            Some(d) => format!(
                "{}_{}_{}_{}.tif",
                self.prefix,
                sanitize(variable),
                d.format("%Y-%m-%d"),
                self.run_id
            ),
            None => format!("{}_{}_{}.tif", self.prefix, sanitize(variable), self.run_id),
        }
    }

    /// Kriging variance raster next to a band
    pub fn variance(&self, variable: &str, date: Option<NaiveDate>) -> String {
        let band = self.band(variable, date);
        let stem = band.strip_suffix(".tif").unwrap_or(&band);
        format!("{}_variance.tif", stem)
    }

    pub fn variable_geostack(&self, variable: &str) -> String {
        format!("{}_{}_geostack_{}.tif", self.prefix, sanitize(variable), self.run_id)
    }

    pub fn combined_geostack(&self) -> String {
        format!("{}_all_variables_geostack_{}.tif", self.prefix, self.run_id)
    }

    pub fn report(&self) -> String {
        format!("{}_run_report_{}.json", self.prefix, self.run_id)
    }
}

/// Catalog path of a geostack: `.tif` becomes `_catalog.json`
pub fn catalog_path(geostack: &Path) -> std::path::PathBuf {
    let stem = geostack
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    geostack.with_file_name(format!("{}_catalog.json", stem))
}

/// Band description: `"<variable> - <date>"`, or `"<variable> - aggregate"`
pub fn band_description(variable: &str, date: Option<NaiveDate>) -> String {
    match date {
        Some(d) => format!("{} - {}", variable, d.format("%Y-%m-%d")),
        None => format!("{} - aggregate", variable),
    }
}

/// Job key used in logs and the run report
pub fn job_key(variable: &str, date: Option<NaiveDate>) -> String {
    match date {
        Some(d) => format!("{}/{}", variable, d.format("%Y-%m-%d")),
        None => variable.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("PM2.5 (ug/m3)"), "PM2-5--ug-m3-");
        assert_eq!(sanitize("no2-avg"), "no2-avg");
        assert_eq!(sanitize(""), "unnamed");
    }

    #[test]
    fn test_names() {
        let names = OutputNames::for_input(Path::new("/data/kampala_air.csv"), None, "ab12cd34");
        let day = NaiveDate::from_ymd_opt(2024, 3, 5);

        assert_eq!(names.band("pm2.5", day), "kampala-air_pm2-5_2024-03-05_ab12cd34.tif");
        assert_eq!(names.band("pm25", None), "kampala-air_pm25_ab12cd34.tif");
        assert_eq!(
            names.variance("pm25", day),
            "kampala-air_pm25_2024-03-05_ab12cd34_variance.tif"
        );
        assert_eq!(names.variable_geostack("pm25"), "kampala-air_pm25_geostack_ab12cd34.tif");
        assert_eq!(
            names.combined_geostack(),
            "kampala-air_all_variables_geostack_ab12cd34.tif"
        );
        assert_eq!(names.report(), "kampala-air_run_report_ab12cd34.json");
        assert_eq!(
            catalog_path(Path::new("/out/kampala-air_pm25_geostack_ab12cd34.tif")),
            Path::new("/out/kampala-air_pm25_geostack_ab12cd34_catalog.json")
        );
    }

    #[test]
    fn test_name_collision() {
        let vars = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(name_collision(&vars(&["pm25", "no2", "pm2.5"])), None);
        assert_eq!(
            name_collision(&vars(&["pm2.5", "no2", "pm2_5"])),
            Some(("pm2.5", "pm2_5"))
        );
        assert_eq!(name_collision(&vars(&["no2", "no2"])), Some(("no2", "no2")));

        // Colliding variables would otherwise share one raster path
        let names = OutputNames::new("c", "r");
        assert_eq!(names.band("pm2.5", None), names.band("pm2_5", None));
    }

    #[test]
    fn test_descriptions() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2);
        assert_eq!(band_description("pm25", day), "pm25 - 2024-01-02");
        assert_eq!(band_description("pm25", None), "pm25 - aggregate");
        assert_eq!(job_key("pm25", day), "pm25/2024-01-02");
    }
}
