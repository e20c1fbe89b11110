//! Coordinate Reference System handling
//!
//! The CRS of every output raster is explicit: it comes from configuration
//! (default WGS84 / EPSG:4326) and is never inferred from the input table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
    /// PROJ string if available
    proj: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
            proj: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
            proj: None,
        }
    }

    /// Create a CRS from a PROJ string
    pub fn from_proj(proj: impl Into<String>) -> Self {
        Self {
            wkt: None,
            epsg: None,
            proj: Some(proj.into()),
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Get PROJ string
    pub fn proj(&self) -> Option<&str> {
        self.proj.as_deref()
    }

    /// Whether coordinates are angular (longitude/latitude degrees).
    ///
    /// Geographic EPSG codes live in the 4000–4999 block; WKT and PROJ
    /// definitions are classified by their keywords.
    pub fn is_geographic(&self) -> bool {
        if let Some(code) = self.epsg {
            return (4000..5000).contains(&code);
        }
        if let Some(wkt) = &self.wkt {
            let upper = wkt.trim_start().to_ascii_uppercase();
            return upper.starts_with("GEOGCS") || upper.starts_with("GEOGCRS");
        }
        if let Some(proj) = &self.proj {
            return proj.contains("+proj=longlat") || proj.contains("+proj=latlong");
        }
        false
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.proj, &other.proj) {
            return a == b;
        }
        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(proj) = &self.proj {
            return proj.clone();
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", &wkt[..wkt.len().min(50)]);
        }
        "Unknown".to_string()
    }
}

impl FromStr for CRS {
    type Err = Error;

    /// Accepts `EPSG:<code>` (case-insensitive), a bare EPSG code, a PROJ
    /// string starting with `+proj=`, or a WKT definition.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = |reason: &str| Error::InvalidParameter {
            name: "crs",
            value: s.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid("empty CRS definition"));
        }

        let upper = trimmed.to_ascii_uppercase();
        if let Some(code) = upper.strip_prefix("EPSG:") {
            return code
                .trim()
                .parse::<u32>()
                .map(CRS::from_epsg)
                .map_err(|_| invalid("EPSG code must be an integer"));
        }
        if let Ok(code) = trimmed.parse::<u32>() {
            return Ok(CRS::from_epsg(code));
        }
        if trimmed.starts_with("+proj=") {
            return Ok(CRS::from_proj(trimmed));
        }
        if ["GEOGCS", "GEOGCRS", "PROJCS", "PROJCRS"]
            .iter()
            .any(|k| upper.starts_with(k))
        {
            return Ok(CRS::from_wkt(trimmed));
        }

        Err(invalid("expected EPSG:<code>, a PROJ string or WKT"))
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(4326);
        assert_eq!(crs.epsg(), Some(4326));
        assert_eq!(crs.identifier(), "EPSG:4326");
        assert!(crs.is_geographic());
    }

    #[test]
    fn test_crs_equivalence() {
        let a: CRS = "epsg:4326".parse().unwrap();
        assert!(a.is_equivalent(&CRS::wgs84()));
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!("32636".parse::<CRS>().unwrap().epsg(), Some(32636));
        assert!(!"EPSG:32636".parse::<CRS>().unwrap().is_geographic());
        assert!("+proj=longlat +datum=WGS84".parse::<CRS>().unwrap().is_geographic());
        assert!("EPSG:abc".parse::<CRS>().is_err());
        assert!("not a crs".parse::<CRS>().is_err());
    }
}
