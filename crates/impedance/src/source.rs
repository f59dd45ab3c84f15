//! Where the pipeline gets its rasters from

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use habiscape_core::io::read_geotiff;
use habiscape_core::raster::Raster;
use habiscape_core::{Error, Result};

/// Opens rasters by path
pub trait RasterSource: Send + Sync {
    /// Read band 1 of the raster at `path` as `f64`
    fn read(&self, path: &Path) -> Result<Raster<f64>>;
}

/// Reads GeoTIFF files from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffSource;

impl RasterSource for GeoTiffSource {
    fn read(&self, path: &Path) -> Result<Raster<f64>> {
        read_geotiff(path, None)
    }
}

/// Rasters held in memory, keyed by path
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    rasters: HashMap<PathBuf, Raster<f64>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<P: Into<PathBuf>>(&mut self, path: P, raster: Raster<f64>) {
        self.rasters.insert(path.into(), raster);
    }

    pub fn with<P: Into<PathBuf>>(mut self, path: P, raster: Raster<f64>) -> Self {
        self.insert(path, raster);
        self
    }
}

impl RasterSource for MemorySource {
    fn read(&self, path: &Path) -> Result<Raster<f64>> {
        self.rasters.get(path).cloned().ok_or_else(|| Error::RasterOpen {
            path: path.display().to_string(),
            reason: "no such raster".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source() {
        let src = MemorySource::new().with("roads.tif", Raster::filled(2, 2, 1.0));
        assert_eq!(src.read(Path::new("roads.tif")).unwrap().shape(), (2, 2));
        assert!(matches!(
            src.read(Path::new("rail.tif")),
            Err(Error::RasterOpen { .. })
        ));
    }

    #[test]
    fn test_geotiff_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GeoTiffSource.read(&dir.path().join("absent.tif")).is_err());
    }
}
