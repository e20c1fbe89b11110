//! Multi-band (band-sequential) GeoTIFF codec
//!
//! Writes every band of a geostack in a single pass as one uncompressed
//! Float32 image with `SamplesPerPixel = N` and `PlanarConfiguration = 2`,
//! one strip per band. Band descriptions go into GDAL_METADATA so GDAL-based
//! tools show them as band names.
//!
//! The reader accepts uncompressed, stripped Float32 images in either byte
//! order and either planar configuration, which covers the files written
//! here and those written by [`super::write_geotiff`].

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::io::atomic::write_atomic;
use crate::io::gdal_metadata::{decode_descriptions, encode_descriptions};
use crate::io::geokeys::{decode_geokeys, encode_geokeys};
use crate::io::tags;
use crate::raster::{GeoTransform, Raster};

mod baseline {
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const PHOTOMETRIC: u16 = 262;
    pub const STRIP_OFFSETS: u16 = 273;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const ROWS_PER_STRIP: u16 = 278;
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    pub const PLANAR_CONFIG: u16 = 284;
    pub const EXTRA_SAMPLES: u16 = 338;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const TILE_OFFSETS: u16 = 324;
}

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_DOUBLE: u16 = 12;

const SAMPLE_FORMAT_IEEEFP: u16 = 3;
const PLANAR_CHUNKY: u16 = 1;
const PLANAR_SEPARATE: u16 = 2;

/// Verify that every band shares the first band's shape, transform and CRS.
///
/// Band numbers in errors are 1-based.
pub fn check_band_profiles(bands: &[Raster<f32>]) -> Result<()> {
    let Some(first) = bands.first() else {
        return Err(Error::InvalidParameter {
            name: "bands",
            value: "0".into(),
            reason: "a multi-band raster needs at least one band".into(),
        });
    };
    let (er, ec) = first.shape();
    if er == 0 || ec == 0 {
        return Err(Error::InvalidDimensions { width: ec, height: er });
    }

    for (i, band) in bands.iter().enumerate().skip(1) {
        let (ar, ac) = band.shape();
        if (ar, ac) != (er, ec) {
            return Err(Error::SizeMismatch {
                band: i + 1,
                er,
                ec,
                ar,
                ac,
            });
        }
        if !first.transform().approx_eq(band.transform()) {
            return Err(Error::TransformMismatch {
                band: i + 1,
                expected: first.transform().to_gdal(),
                actual: band.transform().to_gdal(),
            });
        }
        let same_crs = match (first.crs(), band.crs()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.is_equivalent(b),
            _ => false,
        };
        if !same_crs {
            let label = |c: Option<&crate::CRS>| c.map_or("none".to_string(), |c| c.identifier());
            return Err(Error::CrsMismatch {
                band: i + 1,
                expected: label(first.crs()),
                actual: label(band.crs()),
            });
        }
    }

    Ok(())
}

/// One IFD entry with its value already serialised (little-endian).
struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    data: Vec<u8>,
}

impl Entry {
    fn shorts(tag: u16, values: &[u16]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 2);
        for &v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self { tag, field_type: TYPE_SHORT, count: values.len() as u32, data }
    }

    fn longs(tag: u16, values: &[u32]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 4);
        for &v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self { tag, field_type: TYPE_LONG, count: values.len() as u32, data }
    }

    fn doubles(tag: u16, values: &[f64]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 8);
        for &v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self { tag, field_type: TYPE_DOUBLE, count: values.len() as u32, data }
    }

    fn ascii(tag: u16, text: &str) -> Self {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        Self { tag, field_type: TYPE_ASCII, count: data.len() as u32, data }
    }
}

fn align8(offset: u64) -> u64 {
    offset.div_ceil(8) * 8
}

/// Write bands as one band-sequential Float32 GeoTIFF.
///
/// Every band profile is checked before the destination is touched; a
/// mismatch fails the call without writing any bytes.
pub fn write_multiband_geotiff<P: AsRef<Path>>(bands: &[Raster<f32>], path: P) -> Result<()> {
    check_band_profiles(bands)?;

    let first = &bands[0];
    let (rows, cols) = first.shape();
    let n = bands.len();
    let strip_len = (rows * cols * 4) as u64;

    let gt = first.transform();
    let geokeys = encode_geokeys(first.crs());
    let metadata = encode_descriptions(bands.iter().map(|b| b.description()));

    let mut entries = vec![
        Entry::longs(baseline::IMAGE_WIDTH, &[cols as u32]),
        Entry::longs(baseline::IMAGE_LENGTH, &[rows as u32]),
        Entry::shorts(baseline::BITS_PER_SAMPLE, &vec![32; n]),
        Entry::shorts(baseline::COMPRESSION, &[1]),
        Entry::shorts(baseline::PHOTOMETRIC, &[1]),
        Entry::longs(baseline::STRIP_OFFSETS, &vec![0; n]),
        Entry::shorts(baseline::SAMPLES_PER_PIXEL, &[n as u16]),
        Entry::longs(baseline::ROWS_PER_STRIP, &[rows as u32]),
        Entry::longs(baseline::STRIP_BYTE_COUNTS, &vec![strip_len as u32; n]),
        Entry::shorts(baseline::PLANAR_CONFIG, &[PLANAR_SEPARATE]),
        Entry::shorts(baseline::SAMPLE_FORMAT, &vec![SAMPLE_FORMAT_IEEEFP; n]),
        Entry::doubles(tags::MODEL_PIXEL_SCALE, &[gt.pixel_width, gt.pixel_height.abs(), 0.0]),
        Entry::doubles(tags::MODEL_TIEPOINT, &[0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0]),
        Entry::shorts(tags::GEO_KEY_DIRECTORY, &geokeys.directory),
        Entry::ascii(tags::GDAL_NODATA, "nan"),
    ];
    if n > 1 {
        entries.push(Entry::shorts(baseline::EXTRA_SAMPLES, &vec![0; n - 1]));
    }
    if let Some(ascii) = &geokeys.ascii {
        entries.push(Entry::ascii(tags::GEO_ASCII_PARAMS, ascii));
    }
    if let Some(xml) = &metadata {
        entries.push(Entry::ascii(tags::GDAL_METADATA, xml));
    }
    entries.sort_by_key(|e| e.tag);

    // Layout: header | IFD | out-of-line values | band strips
    let ifd_len = 2 + 12 * entries.len() as u64 + 4;
    let mut cursor = 8 + ifd_len;
    let mut value_offsets = Vec::with_capacity(entries.len());
    for entry in &entries {
        if entry.data.len() > 4 {
            cursor = align8(cursor);
            value_offsets.push(Some(cursor));
            cursor += entry.data.len() as u64;
        } else {
            value_offsets.push(None);
        }
    }
    let image_start = align8(cursor);
    let file_len = image_start + strip_len * n as u64;
    if file_len > u32::MAX as u64 {
        return Err(Error::InvalidParameter {
            name: "bands",
            value: n.to_string(),
            reason: format!("geostack of {} bytes exceeds the classic TIFF 4 GiB limit", file_len),
        });
    }

    let strip_offsets: Vec<u32> = (0..n as u64)
        .map(|b| (image_start + b * strip_len) as u32)
        .collect();
    if let Some(entry) = entries.iter_mut().find(|e| e.tag == baseline::STRIP_OFFSETS) {
        *entry = Entry::longs(baseline::STRIP_OFFSETS, &strip_offsets);
    }

    write_atomic(path, |w| {
        w.write_all(b"II")?;
        w.write_u16::<LittleEndian>(42)?;
        w.write_u32::<LittleEndian>(8)?;

        w.write_u16::<LittleEndian>(entries.len() as u16)?;
        for (entry, offset) in entries.iter().zip(&value_offsets) {
            w.write_u16::<LittleEndian>(entry.tag)?;
            w.write_u16::<LittleEndian>(entry.field_type)?;
            w.write_u32::<LittleEndian>(entry.count)?;
            match offset {
                Some(off) => w.write_u32::<LittleEndian>(*off as u32)?,
                None => {
                    let mut inline = [0u8; 4];
                    inline[..entry.data.len()].copy_from_slice(&entry.data);
                    w.write_all(&inline)?;
                }
            }
        }
        w.write_u32::<LittleEndian>(0)?;

        let mut written = 8 + ifd_len;
        for (entry, offset) in entries.iter().zip(&value_offsets) {
            if let Some(off) = offset {
                pad(w, *off - written)?;
                w.write_all(&entry.data)?;
                written = *off + entry.data.len() as u64;
            }
        }
        pad(w, image_start - written)?;

        for band in bands {
            for &v in band.data().iter() {
                w.write_f32::<LittleEndian>(v)?;
            }
        }
        Ok(())
    })
}

fn pad<W: Write>(w: &mut W, n: u64) -> Result<()> {
    for _ in 0..n {
        w.write_u8(0)?;
    }
    Ok(())
}

/// Read every band of a GeoTIFF. Each band carries the file's transform
/// and CRS plus its own description.
pub fn read_multiband_geotiff<P: AsRef<Path>>(path: P) -> Result<Vec<Raster<f32>>> {
    let bytes = std::fs::read(path.as_ref())?;
    match bytes.get(0..2) {
        Some(b"II") => decode::<LittleEndian>(&bytes),
        Some(b"MM") => decode::<BigEndian>(&bytes),
        _ => Err(Error::Tiff("invalid byte order marker".into())),
    }
}

/// Read one band (1-based, as GDAL numbers them).
pub fn read_band<P: AsRef<Path>>(path: P, band: usize) -> Result<Raster<f32>> {
    let mut bands = read_multiband_geotiff(path)?;
    if band == 0 || band > bands.len() {
        return Err(Error::InvalidParameter {
            name: "band",
            value: band.to_string(),
            reason: format!("file has {} band(s)", bands.len()),
        });
    }
    Ok(bands.swap_remove(band - 1))
}

struct RawEntry<'a> {
    field_type: u16,
    count: usize,
    data: &'a [u8],
}

fn type_size(field_type: u16) -> Option<usize> {
    match field_type {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

fn truncated() -> Error {
    Error::Tiff("file truncated".into())
}

fn decode<B: ByteOrder>(bytes: &[u8]) -> Result<Vec<Raster<f32>>> {
    let header = bytes.get(0..8).ok_or_else(truncated)?;
    if B::read_u16(&header[2..4]) != 42 {
        return Err(Error::Tiff("not a classic TIFF (BigTIFF is not supported)".into()));
    }
    let ifd = B::read_u32(&header[4..8]) as usize;
    let count = B::read_u16(bytes.get(ifd..ifd + 2).ok_or_else(truncated)?) as usize;

    let mut entries = std::collections::BTreeMap::new();
    for i in 0..count {
        let base = ifd + 2 + i * 12;
        let raw = bytes.get(base..base + 12).ok_or_else(truncated)?;
        let tag = B::read_u16(&raw[0..2]);
        let field_type = B::read_u16(&raw[2..4]);
        let n = B::read_u32(&raw[4..8]) as usize;
        let Some(size) = type_size(field_type) else {
            continue;
        };
        let len = size * n;
        let data = if len <= 4 {
            &raw[8..8 + len]
        } else {
            let off = B::read_u32(&raw[8..12]) as usize;
            bytes.get(off..off + len).ok_or_else(truncated)?
        };
        entries.insert(tag, RawEntry { field_type, count: n, data });
    }

    let uints = |tag: u16| -> Option<Vec<u64>> {
        let e = entries.get(&tag)?;
        match e.field_type {
            3 => Some((0..e.count).map(|i| B::read_u16(&e.data[i * 2..]) as u64).collect()),
            4 => Some((0..e.count).map(|i| B::read_u32(&e.data[i * 4..]) as u64).collect()),
            _ => None,
        }
    };
    let doubles = |tag: u16| -> Option<Vec<f64>> {
        let e = entries.get(&tag)?;
        (e.field_type == TYPE_DOUBLE)
            .then(|| (0..e.count).map(|i| B::read_f64(&e.data[i * 8..])).collect())
    };
    let ascii = |tag: u16| -> Option<String> {
        let e = entries.get(&tag)?;
        (e.field_type == TYPE_ASCII).then(|| {
            String::from_utf8_lossy(e.data)
                .trim_end_matches('\0')
                .to_string()
        })
    };
    let first = |tag: u16, default: u64| uints(tag).and_then(|v| v.first().copied()).unwrap_or(default);

    if entries.contains_key(&baseline::TILE_OFFSETS) {
        return Err(Error::UnsupportedDataType("tiled TIFF layout".into()));
    }
    if first(baseline::COMPRESSION, 1) != 1 {
        return Err(Error::UnsupportedDataType("compressed TIFF data".into()));
    }
    let bits = first(baseline::BITS_PER_SAMPLE, 1);
    let format = first(baseline::SAMPLE_FORMAT, 1);
    if bits != 32 || format != SAMPLE_FORMAT_IEEEFP as u64 {
        return Err(Error::UnsupportedDataType(format!(
            "{}-bit samples with format {} (expected Float32)",
            bits, format
        )));
    }

    let cols = first(baseline::IMAGE_WIDTH, 0) as usize;
    let rows = first(baseline::IMAGE_LENGTH, 0) as usize;
    let n_bands = first(baseline::SAMPLES_PER_PIXEL, 1) as usize;
    let planar = first(baseline::PLANAR_CONFIG, PLANAR_CHUNKY as u64) as u16;
    let rows_per_strip = (first(baseline::ROWS_PER_STRIP, rows as u64) as usize).clamp(1, rows.max(1));
    let offsets = uints(baseline::STRIP_OFFSETS).ok_or_else(|| Error::Tiff("missing StripOffsets".into()))?;
    let counts = uints(baseline::STRIP_BYTE_COUNTS).ok_or_else(|| Error::Tiff("missing StripByteCounts".into()))?;
    if rows == 0 || cols == 0 || n_bands == 0 || offsets.len() != counts.len() {
        return Err(Error::Tiff("inconsistent image layout".into()));
    }

    let strip = |i: usize| -> Result<&[u8]> {
        let off = *offsets.get(i).ok_or_else(truncated)? as usize;
        let len = *counts.get(i).ok_or_else(truncated)? as usize;
        bytes.get(off..off + len).ok_or_else(truncated)
    };
    let cells = rows * cols;
    let mut planes: Vec<Vec<f32>> = vec![Vec::with_capacity(cells); n_bands];

    if planar == PLANAR_SEPARATE {
        let strips_per_band = rows.div_ceil(rows_per_strip);
        for (b, plane) in planes.iter_mut().enumerate() {
            for s in 0..strips_per_band {
                let data = strip(b * strips_per_band + s)?;
                plane.extend(data.chunks_exact(4).map(B::read_f32));
            }
            plane.truncate(cells);
        }
    } else {
        let mut sample = 0usize;
        for s in 0..offsets.len() {
            for chunk in strip(s)?.chunks_exact(4) {
                planes[sample % n_bands].push(B::read_f32(chunk));
                sample += 1;
            }
        }
        for plane in planes.iter_mut() {
            plane.truncate(cells);
        }
    }

    let transform = match (doubles(tags::MODEL_PIXEL_SCALE), doubles(tags::MODEL_TIEPOINT)) {
        (Some(scale), Some(tie)) if scale.len() >= 2 && tie.len() >= 6 => GeoTransform::new(
            tie[3] - tie[0] * scale[0],
            tie[4] + tie[1] * scale[1],
            scale[0],
            -scale[1],
        ),
        _ => GeoTransform::default(),
    };
    let crs = uints(tags::GEO_KEY_DIRECTORY).and_then(|keys| {
        let keys: Vec<u16> = keys.into_iter().map(|k| k as u16).collect();
        decode_geokeys(&keys, ascii(tags::GEO_ASCII_PARAMS).as_deref())
    });
    let mut descriptions = match ascii(tags::GDAL_METADATA) {
        Some(xml) => decode_descriptions(&xml)?,
        None => Default::default(),
    };

    planes
        .into_iter()
        .enumerate()
        .map(|(b, plane)| -> Result<Raster<f32>> {
            let mut raster = Raster::from_vec(plane, rows, cols)?;
            raster.set_transform(transform);
            raster.set_crs(crs.clone());
            raster.set_description(descriptions.remove(&b));
            Ok(raster)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::CRS;
    use crate::io::{read_geotiff, write_geotiff};

    fn band(seed: f32, description: &str) -> Raster<f32> {
        let mut raster = Raster::new(5, 7);
        for row in 0..5 {
            for col in 0..7 {
                raster.set(row, col, seed + (row * 7 + col) as f32 * 0.1).unwrap();
            }
        }
        raster.set(2, 3, f32::NAN).unwrap();
        raster.set_transform(GeoTransform::from_bounds((29.5, -1.0, 35.0, 4.0), 7, 5));
        raster.set_crs(Some(CRS::wgs84()));
        raster.set_description(Some(description.to_string()));
        raster
    }

    fn same_bits(a: &Raster<f32>, b: &Raster<f32>) -> bool {
        a.data()
            .iter()
            .zip(b.data().iter())
            .all(|(x, y)| x.to_bits() == y.to_bits())
    }

    #[test]
    fn test_multiband_roundtrip_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.tif");
        let bands = vec![band(1.0, "NDVI - 2024-01-01"), band(-3.5, "NDVI - 2024-01-02"), band(9.0, "NDVI - 2024-01-03")];

        write_multiband_geotiff(&bands, &path).unwrap();
        let back = read_multiband_geotiff(&path).unwrap();

        assert_eq!(back.len(), 3);
        for (orig, read) in bands.iter().zip(&back) {
            assert!(same_bits(orig, read));
            assert_eq!(orig.description(), read.description());
            assert!(orig.transform().approx_eq(read.transform()));
            assert_eq!(read.crs().and_then(|c| c.epsg()), Some(4326));
        }

        let second = read_band(&path, 2).unwrap();
        assert!(same_bits(&bands[1], &second));
        assert!(read_band(&path, 0).is_err());
        assert!(read_band(&path, 4).is_err());
    }

    #[test]
    fn test_shape_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.tif");
        let mut odd: Raster<f32> = Raster::filled(4, 7, 1.0);
        odd.set_transform(*band(0.0, "x").transform());
        odd.set_crs(Some(CRS::wgs84()));

        let err = write_multiband_geotiff(&[band(0.0, "a"), odd], &path).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { band: 2, .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_transform_and_crs_mismatch() {
        let a = band(0.0, "a");
        let mut shifted = band(0.0, "b");
        shifted.set_transform(GeoTransform::from_bounds((30.5, -1.0, 36.0, 4.0), 7, 5));
        assert!(matches!(
            check_band_profiles(&[a.clone(), shifted]),
            Err(Error::TransformMismatch { band: 2, .. })
        ));

        let mut utm = band(0.0, "c");
        utm.set_crs(Some(CRS::from_epsg(32636)));
        assert!(matches!(
            check_band_profiles(&[a, utm]),
            Err(Error::CrsMismatch { band: 2, .. })
        ));
    }

    #[test]
    fn test_reads_single_band_files_from_tiff_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("single.tif");
        let original = band(4.0, "EH - 2024-02-10");

        write_geotiff(&original, &path, None).unwrap();
        let via_codec = read_band(&path, 1).unwrap();
        let via_tiff: Raster<f32> = read_geotiff(&path).unwrap();

        assert!(same_bits(&original, &via_codec));
        assert!(same_bits(&via_tiff, &via_codec));
        assert_eq!(via_codec.description(), Some("EH - 2024-02-10"));
    }
}
