//! # Habiscape Core
//!
//! Raster primitives shared by the habiscape crates.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced 2D grid with an optional no-data value
//! - `GeoTransform`: affine pixel <-> map coordinate transform
//! - `CRS`: coordinate reference system identifier
//! - GeoTIFF reading and writing (native `tiff` backend, GDAL behind the `gdal` feature)

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement, DEFAULT_NODATA};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement, DEFAULT_NODATA};
}
