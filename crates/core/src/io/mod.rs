//! GeoTIFF reading and writing
//!
//! The native backend (pure Rust, `tiff` crate) is always available. With the
//! `gdal` feature, `read_geotiff`/`write_geotiff` go through GDAL instead.

#[cfg(feature = "gdal")]
mod gdal_io;
mod native;

use serde::{Deserialize, Serialize};

#[cfg(feature = "gdal")]
pub use gdal_io::{read_geotiff, write_geotiff};

#[cfg(not(feature = "gdal"))]
pub use native::{read_geotiff, write_geotiff};

// Buffer-based I/O, no filesystem involved
pub use native::{read_geotiff_from_buffer, write_geotiff_to_buffer};

/// Compression applied to written GeoTIFFs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Lzw,
    Deflate,
}

impl Compression {
    /// GDAL creation option value
    pub fn gdal_name(&self) -> &'static str {
        match self {
            Compression::None => "NONE",
            Compression::Lzw => "LZW",
            Compression::Deflate => "DEFLATE",
        }
    }
}

/// Pixel type of written GeoTIFFs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    /// 32-bit signed integer, values rounded to the nearest integer
    #[default]
    Int32,
    Float32,
    Float64,
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeoTiffOptions {
    #[serde(default)]
    pub compression: Compression,
    #[serde(default)]
    pub pixel_type: PixelType,
}

impl GeoTiffOptions {
    pub fn new(pixel_type: PixelType, compression: Compression) -> Self {
        Self {
            compression,
            pixel_type,
        }
    }
}
