//! Coordinate reference system identifiers
//!
//! Rasters only carry their CRS through the pipeline; nothing here
//! reprojects. Derived rasters copy the CRS of their source.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate reference system attached to a raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// EPSG code, when known
    epsg: Option<u32>,
    /// WKT definition, when the source had no usable EPSG authority
    wkt: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            wkt: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: Some(wkt.into()),
        }
    }

    /// British National Grid (EPSG:27700), the projection of the UKCEH land cover maps
    pub fn british_national_grid() -> Self {
        Self::from_epsg(27700)
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Whether the EPSG code falls in the geographic 2D range (4000-4999).
    ///
    /// Only used to pick the GeoKey written to native GeoTIFFs.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, Some(code) if (4000..5000).contains(&code))
    }

    /// Check if two CRS refer to the same system
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        match (self.epsg, other.epsg) {
            (Some(a), Some(b)) => a == b,
            _ => match (&self.wkt, &other.wkt) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Short identifier used in log messages
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        match &self.wkt {
            Some(wkt) => format!("WKT:{}", wkt.chars().take(50).collect::<String>()),
            None => "Unknown".to_string(),
        }
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}
