//! GeoTIFF reading and writing using GDAL

use std::path::Path;

use gdal::cpl::CslStringList;
use gdal::raster::{Buffer, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};

use super::{GeoTiffOptions, PixelType};
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement, DEFAULT_NODATA};

/// Read a band of a GeoTIFF file into a Raster
///
/// # Arguments
/// * `path` - Path to the GeoTIFF file
/// * `band` - Band number (1-indexed), defaults to 1
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let dataset = Dataset::open(path).map_err(|e| Error::RasterOpen {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let rasterband = dataset.rasterband(band.unwrap_or(1))?;
    let (cols, rows) = dataset.raster_size();

    let buffer = rasterband.read_as::<f64>((0, 0), (cols, rows), (cols, rows), None)?;
    let nodata = rasterband.no_data_value();

    let data = buffer
        .data()
        .iter()
        .map(|&v| {
            T::from_f64(v).or_else(|| nodata.and_then(T::from_f64)).ok_or_else(|| {
                Error::UnsupportedDataType(format!("value {} does not fit the requested type", v))
            })
        })
        .collect::<Result<Vec<T>>>()?;

    let mut raster = Raster::from_vec(data, rows, cols)?;
    raster.set_nodata(nodata.and_then(T::from_f64));

    if let Ok(gt) = dataset.geo_transform() {
        raster.set_transform(GeoTransform::from_gdal(gt));
    }

    if let Ok(srs) = dataset.spatial_ref() {
        let crs = match srs.auth_code() {
            Ok(code) => Some(CRS::from_epsg(code as u32)),
            Err(_) => srs.to_wkt().ok().map(CRS::from_wkt),
        };
        raster.set_crs(crs);
    }

    Ok(raster)
}

/// Write a Raster to a GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let opts = options.unwrap_or_default();
    match opts.pixel_type {
        PixelType::Int32 => {
            let fallback = (raster.nodata().is_none() && raster.count_nodata() > 0)
                .then_some(DEFAULT_NODATA as i32);
            write_typed(&raster.cast::<i32>(fallback)?, path.as_ref(), &opts)
        }
        PixelType::Float32 => write_typed(&raster.cast::<f32>(None)?, path.as_ref(), &opts),
        PixelType::Float64 => write_typed(&raster.cast::<f64>(None)?, path.as_ref(), &opts),
    }
}

fn write_typed<T>(raster: &Raster<T>, path: &Path, opts: &GeoTiffOptions) -> Result<()>
where
    T: RasterElement + GdalType,
{
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (rows, cols) = raster.shape();

    let mut create_options = CslStringList::new();
    create_options.add_string(&format!("COMPRESS={}", opts.compression.gdal_name()))?;

    let mut dataset =
        driver.create_with_band_type_with_options::<T, _>(path, cols, rows, 1, &create_options)?;

    dataset.set_geo_transform(&raster.transform().to_gdal())?;

    if let Some(crs) = raster.crs() {
        let srs = match (crs.epsg(), crs.wkt()) {
            (Some(epsg), _) => Some(SpatialRef::from_epsg(epsg)?),
            (None, Some(wkt)) => Some(SpatialRef::from_wkt(wkt)?),
            (None, None) => None,
        };
        if let Some(srs) = srs {
            dataset.set_spatial_ref(&srs)?;
        }
    }

    let mut band = dataset.rasterband(1)?;
    if let Some(nodata) = raster.nodata() {
        band.set_no_data_value(Some(nodata.as_f64()))?;
    }

    let mut buffer = Buffer::new((cols, rows), raster.data().iter().copied().collect());
    band.write((0, 0), (cols, rows), &mut buffer)?;

    Ok(())
}
