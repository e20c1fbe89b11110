//! GeoKeyDirectory encoding (TIFF tag 34735)
//!
//! EPSG codes are written as `GeographicTypeGeoKey` (2048) for geographic
//! systems and `ProjectedCSTypeGeoKey` (3072) otherwise. WKT and PROJ
//! definitions go into `GTCitationGeoKey` (1026) backed by GeoAsciiParams.

use crate::crs::CRS;
use crate::io::tags;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GT_CITATION: u16 = 1026;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_PROJECTED: u16 = 1;
const MODEL_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Encoded GeoKeys plus the optional GeoAsciiParams payload.
pub(crate) struct GeoKeys {
    pub directory: Vec<u16>,
    pub ascii: Option<String>,
}

pub(crate) fn encode_geokeys(crs: Option<&CRS>) -> GeoKeys {
    let mut keys: Vec<[u16; 4]> = vec![[GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA]];
    let mut ascii = None;

    if let Some(crs) = crs {
        let model = if crs.is_geographic() {
            MODEL_GEOGRAPHIC
        } else {
            MODEL_PROJECTED
        };
        keys.push([GT_MODEL_TYPE, 0, 1, model]);

        match crs.epsg().and_then(|c| u16::try_from(c).ok()) {
            Some(code) if model == MODEL_GEOGRAPHIC => keys.push([GEOGRAPHIC_TYPE, 0, 1, code]),
            Some(code) => keys.push([PROJECTED_CS_TYPE, 0, 1, code]),
            None => {
                let text = crs
                    .wkt()
                    .or_else(|| crs.proj())
                    .map(str::to_string)
                    .unwrap_or_else(|| crs.identifier());
                let payload = format!("{}|", text);
                keys.push([
                    GT_CITATION,
                    tags::GEO_ASCII_PARAMS,
                    payload.len() as u16,
                    0,
                ]);
                ascii = Some(payload);
            }
        }
    }

    keys.sort_by_key(|k| k[0]);

    let mut directory = vec![1, 1, 0, keys.len() as u16];
    for key in keys {
        directory.extend_from_slice(&key);
    }

    GeoKeys { directory, ascii }
}

pub(crate) fn decode_geokeys(directory: &[u16], ascii: Option<&str>) -> Option<CRS> {
    if directory.len() < 4 {
        return None;
    }
    let n = directory[3] as usize;

    let mut citation = None;
    for i in 0..n {
        let base = 4 + i * 4;
        let Some(entry) = directory.get(base..base + 4) else {
            break;
        };
        let (key, location, count, value) = (entry[0], entry[1], entry[2], entry[3]);
        match key {
            GEOGRAPHIC_TYPE | PROJECTED_CS_TYPE if location == 0 && value != 0 && value != 32767 => {
                return Some(CRS::from_epsg(value as u32));
            }
            GT_CITATION if location == tags::GEO_ASCII_PARAMS => {
                if let Some(text) = ascii {
                    let start = value as usize;
                    let end = (start + count as usize).min(text.len());
                    if let Some(slice) = text.get(start..end) {
                        citation = Some(slice.trim_end_matches(['|', '\0']).to_string());
                    }
                }
            }
            _ => {}
        }
    }

    citation.and_then(|c| c.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geographic_epsg_roundtrip() {
        let keys = encode_geokeys(Some(&CRS::wgs84()));
        assert!(keys.ascii.is_none());
        let crs = decode_geokeys(&keys.directory, None).unwrap();
        assert_eq!(crs.epsg(), Some(4326));
    }

    #[test]
    fn test_projected_epsg_roundtrip() {
        let keys = encode_geokeys(Some(&CRS::from_epsg(32636)));
        let crs = decode_geokeys(&keys.directory, None).unwrap();
        assert_eq!(crs.epsg(), Some(32636));
    }

    #[test]
    fn test_proj_string_via_citation() {
        let original = CRS::from_proj("+proj=utm +zone=36 +datum=WGS84");
        let keys = encode_geokeys(Some(&original));
        let crs = decode_geokeys(&keys.directory, keys.ascii.as_deref()).unwrap();
        assert!(crs.is_equivalent(&original));
    }

    #[test]
    fn test_no_crs() {
        let keys = encode_geokeys(None);
        assert!(decode_geokeys(&keys.directory, None).is_none());
    }
}
