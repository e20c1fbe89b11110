//! Single-band GeoTIFF reading/writing through the `tiff` crate
//!
//! Rasters are written as uncompressed Float32 with:
//! - ModelPixelScale + ModelTiepoint (north-up transform)
//! - GeoKeyDirectory carrying the CRS
//! - GDAL_METADATA band description and GDAL_NODATA = "nan"

use num_traits::NumCast;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

use crate::error::{Error, Result};
use crate::io::atomic::write_atomic;
use crate::io::gdal_metadata::{decode_descriptions, encode_descriptions};
use crate::io::geokeys::{decode_geokeys, encode_geokeys};
use crate::io::tags;
use crate::raster::{GeoTransform, Raster, RasterElement};

/// Options for writing single-band GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Band description override; falls back to the raster's own description
    pub description: Option<String>,
}

/// Read a single-band GeoTIFF into a Raster.
///
/// The transform, CRS and band description are restored when the
/// corresponding tags are present.
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

fn cast_all<S: num_traits::ToPrimitive + Copy, T: RasterElement>(buf: &[S]) -> Vec<T> {
    buf.iter()
        .map(|&v| <T as NumCast>::from(v).unwrap_or_else(T::nodata))
        .collect()
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let rows = height as usize;
    let cols = width as usize;

    let data: Vec<T> = match decoder.read_image()? {
        DecodingResult::F32(buf) => cast_all(&buf),
        DecodingResult::F64(buf) => cast_all(&buf),
        DecodingResult::U8(buf) => cast_all(&buf),
        DecodingResult::U16(buf) => cast_all(&buf),
        DecodingResult::I16(buf) => cast_all(&buf),
        DecodingResult::I32(buf) => cast_all(&buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ));
        }
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }

    if let Ok(keys) = decoder.get_tag_u16_vec(Tag::Unknown(tags::GEO_KEY_DIRECTORY)) {
        let ascii = decoder
            .get_tag_ascii_string(Tag::Unknown(tags::GEO_ASCII_PARAMS))
            .ok();
        raster.set_crs(decode_geokeys(&keys, ascii.as_deref()));
    }

    if let Ok(xml) = decoder.get_tag_ascii_string(Tag::Unknown(tags::GDAL_METADATA)) {
        let mut descriptions = decode_descriptions(&xml)?;
        raster.set_description(descriptions.remove(&0));
    }

    Ok(raster)
}

/// Read the transform from ModelPixelScale + ModelTiepoint
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::Unknown(tags::MODEL_PIXEL_SCALE))
        .ok()?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::Unknown(tags::MODEL_TIEPOINT))
        .ok()?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    None
}

/// Write a Raster to a single-band Float32 GeoTIFF.
///
/// NaN cells are written as NaN and declared as nodata. The file appears
/// at `path` only once it is complete.
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let options = options.unwrap_or_default();
    write_atomic(path, |writer| encode_geotiff(raster, &options, writer))
}

fn encode_geotiff<T, W>(raster: &Raster<T>, options: &GeoTiffOptions, writer: W) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let (rows, cols) = raster.shape();
    if rows == 0 || cols == 0 {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| <f32 as NumCast>::from(v).unwrap_or(f32::NAN))
        .collect();

    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32)?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(tags::MODEL_PIXEL_SCALE), &scale[..])?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(tags::MODEL_TIEPOINT), &tiepoint[..])?;

    let geokeys = encode_geokeys(raster.crs());
    image
        .encoder()
        .write_tag(Tag::Unknown(tags::GEO_KEY_DIRECTORY), geokeys.directory.as_slice())?;
    if let Some(ascii) = &geokeys.ascii {
        image
            .encoder()
            .write_tag(Tag::Unknown(tags::GEO_ASCII_PARAMS), ascii.as_str())?;
    }

    let description = options.description.as_deref().or(raster.description());
    if let Some(xml) = encode_descriptions([description]) {
        image
            .encoder()
            .write_tag(Tag::Unknown(tags::GDAL_METADATA), xml.as_str())?;
    }
    image
        .encoder()
        .write_tag(Tag::Unknown(tags::GDAL_NODATA), "nan")?;

    image.write_data(&data)?;

    Ok(())
}
