//! Native GeoTIFF reading/writing (without GDAL dependency)
//!
//! Georeferencing is carried by the ModelPixelScale/ModelTiepoint tags, the
//! no-data value by the GDAL_NODATA ASCII tag and the EPSG code by a minimal
//! GeoKey directory. That is all the impedance rasters need.

use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{ColorType, Gray32Float, Gray64Float, GrayI32};
use tiff::encoder::compression::{Compression as TiffCompression, Deflate, Lzw, Uncompressed};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;
use tracing::debug;

use super::{Compression, GeoTiffOptions, PixelType};
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement, DEFAULT_NODATA};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Read the first band of a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::RasterOpen {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    decode_geotiff(file, band).map_err(|e| match e {
        Error::Tiff(reason) => Error::RasterOpen {
            path: path.display().to_string(),
            reason,
        },
        other => other,
    })
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8], band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data), band)
}

fn decode_geotiff<T, R>(reader: R, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    if let Some(b) = band.filter(|&b| b != 1) {
        return Err(Error::UnsupportedDataType(format!(
            "native reader only supports band 1, got {}",
            b
        )));
    }

    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());
    let (width, height) = decoder.dimensions()?;
    let (rows, cols) = (height as usize, width as usize);

    let values: Vec<f64> = match decoder.read_image()? {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        _ => {
            return Err(Error::UnsupportedDataType(
                "unsupported TIFF sample format".to_string(),
            ))
        }
    };

    if values.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let nodata = read_nodata(&mut decoder);
    let data = values
        .into_iter()
        .map(|v| {
            T::from_f64(v).or_else(|| nodata.and_then(T::from_f64)).ok_or_else(|| {
                Error::UnsupportedDataType(format!("value {} does not fit the requested type", v))
            })
        })
        .collect::<Result<Vec<T>>>()?;

    let mut raster = Raster::from_vec(data, rows, cols)?;
    raster.set_nodata(nodata.and_then(T::from_f64));

    match read_geotransform(&mut decoder) {
        Some(transform) => raster.set_transform(transform),
        None => debug!("GeoTIFF has no pixel scale/tiepoint tags, using identity transform"),
    }
    raster.set_crs(read_epsg(&mut decoder).map(CRS::from_epsg));

    Ok(raster)
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA)).ok()?;
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .parse::<f64>()
        .ok()
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    Some(GeoTransform::new(
        tiepoint[3] - tiepoint[0] * scale[0],
        tiepoint[4] + tiepoint[1] * scale[1],
        scale[0],
        -scale[1],
    ))
}

fn read_epsg<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let keys = decoder.get_tag_u16_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY)).ok()?;

    // Header is [version, revision, minor, count], then 4 shorts per key:
    // [key id, tag location, count, value]. Location 0 means inline value.
    keys.get(4..)?
        .chunks_exact(4)
        .find(|entry| {
            matches!(entry[0], PROJECTED_CS_TYPE_KEY | GEOGRAPHIC_TYPE_KEY) && entry[1] == 0
        })
        .map(|entry| u32::from(entry[3]))
        .filter(|&code| code != 0 && code != 32767)
}

/// Write a Raster to a GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    encode_geotiff(raster, &mut writer, options.unwrap_or_default())?;
    writer.flush()?;
    Ok(())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, &mut Cursor::new(&mut buf), options.unwrap_or_default())?;
    Ok(buf)
}

/// Georeferencing tags shared by every pixel type
struct GeoTags {
    scale: [f64; 3],
    tiepoint: [f64; 6],
    geokeys: Vec<u16>,
    nodata: Option<String>,
}

impl GeoTags {
    fn from_raster<T: RasterElement>(raster: &Raster<T>, nodata: Option<f64>) -> Self {
        let gt = raster.transform();

        let mut geokeys: Vec<u16> = vec![1, 1, 0, 0];
        let epsg = raster.crs().and_then(|crs| crs.epsg().map(|code| (code, crs.is_geographic())));
        let model_type = match epsg {
            Some((_, true)) => 2,
            _ => 1,
        };
        geokeys.extend_from_slice(&[GT_MODEL_TYPE_KEY, 0, 1, model_type]);
        geokeys.extend_from_slice(&[GT_RASTER_TYPE_KEY, 0, 1, 1]);
        if let Some((code, geographic)) = epsg.filter(|(code, _)| *code <= u32::from(u16::MAX)) {
            let key = if geographic { GEOGRAPHIC_TYPE_KEY } else { PROJECTED_CS_TYPE_KEY };
            geokeys.extend_from_slice(&[key, 0, 1, code as u16]);
        }
        geokeys[3] = ((geokeys.len() - 4) / 4) as u16;

        Self {
            scale: [gt.pixel_width, gt.pixel_height.abs(), 0.0],
            tiepoint: [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0],
            geokeys,
            nodata: nodata.map(|nd| format!("{}", nd)),
        }
    }
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: &mut W, options: GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer)?;

    match options.pixel_type {
        PixelType::Int32 => {
            let fallback = (raster.nodata().is_none() && raster.count_nodata() > 0)
                .then_some(DEFAULT_NODATA as i32);
            let typed: Raster<i32> = raster.cast(fallback)?;
            let tags = GeoTags::from_raster(&typed, typed.nodata().map(f64::from));
            let data: Vec<i32> = typed.data().iter().copied().collect();
            encode_with_compression::<_, GrayI32>(&mut encoder, raster.shape(), &tags, &data, options.compression)
        }
        PixelType::Float32 => {
            let typed: Raster<f32> = raster.cast(None)?;
            let tags = GeoTags::from_raster(&typed, typed.nodata().map(f64::from));
            let data: Vec<f32> = typed.data().iter().copied().collect();
            encode_with_compression::<_, Gray32Float>(&mut encoder, raster.shape(), &tags, &data, options.compression)
        }
        PixelType::Float64 => {
            let typed: Raster<f64> = raster.cast(None)?;
            let tags = GeoTags::from_raster(&typed, typed.nodata());
            let data: Vec<f64> = typed.data().iter().copied().collect();
            encode_with_compression::<_, Gray64Float>(&mut encoder, raster.shape(), &tags, &data, options.compression)
        }
    }
}

fn encode_with_compression<W, C>(
    encoder: &mut TiffEncoder<W>,
    shape: (usize, usize),
    tags: &GeoTags,
    data: &[C::Inner],
    compression: Compression,
) -> Result<()>
where
    W: Write + Seek,
    C: ColorType,
    [C::Inner]: TiffValue,
{
    match compression {
        Compression::None => encode_image::<W, C, _>(encoder, shape, tags, data, Uncompressed),
        Compression::Lzw => encode_image::<W, C, _>(encoder, shape, tags, data, Lzw::default()),
        Compression::Deflate => encode_image::<W, C, _>(encoder, shape, tags, data, Deflate::default()),
    }
}

fn encode_image<W, C, D>(
    encoder: &mut TiffEncoder<W>,
    (rows, cols): (usize, usize),
    tags: &GeoTags,
    data: &[C::Inner],
    compression: D,
) -> Result<()>
where
    W: Write + Seek,
    C: ColorType,
    [C::Inner]: TiffValue,
    D: TiffCompression,
{
    let mut image = encoder.new_image_with_compression::<C, D>(cols as u32, rows as u32, compression)?;

    let dir = image.encoder();
    dir.write_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE), &tags.scale[..])?;
    dir.write_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT), &tags.tiepoint[..])?;
    dir.write_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY), tags.geokeys.as_slice())?;
    if let Some(nodata) = &tags.nodata {
        dir.write_tag(Tag::from_u16_exhaustive(GDAL_NODATA), nodata.as_str())?;
    }

    image.write_data(data)?;
    Ok(())
}
