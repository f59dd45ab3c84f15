//! Impedance layers with an explicit validity mask
//!
//! Inside the engine a cell either has an impedance value or it does not;
//! the numeric no-data sentinel only reappears when a layer is turned back
//! into a [`Raster`] for persistence.

use ndarray::Array2;

use crate::maybe_rayon::*;
use habiscape_core::raster::Raster;
use habiscape_core::{Error, GeoTransform, Result, CRS};

/// A georeferenced grid of optional values: impedances, or distances on the way to them.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpedanceLayer {
    values: Array2<Option<f64>>,
    transform: GeoTransform,
    crs: Option<CRS>,
}

impl ImpedanceLayer {
    /// Build a layer from cell values and georeferencing
    pub fn new(values: Array2<Option<f64>>, transform: GeoTransform, crs: Option<CRS>) -> Self {
        Self {
            values,
            transform,
            crs,
        }
    }

    /// Wrap a raster, treating no-data and NaN cells as missing
    pub fn from_raster(raster: &Raster<f64>) -> Self {
        let values = raster
            .data()
            .mapv(|v| if raster.is_nodata(v) { None } else { Some(v) });
        Self::new(values, *raster.transform(), raster.crs().cloned())
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.values.get((row, col)).copied().flatten()
    }

    pub fn values(&self) -> &Array2<Option<f64>> {
        &self.values
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Number of cells holding a value
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Whether this layer sits on exactly the grid of `raster`
    pub fn matches_grid<T: habiscape_core::RasterElement>(&self, raster: &Raster<T>) -> bool {
        self.shape() == raster.shape() && self.transform.same_grid(raster.transform())
    }

    /// Resample onto the grid of `target` by nearest pixel centre.
    ///
    /// Target cells whose centre falls outside this layer get no value, so a
    /// larger layer is clipped to the target extent and a smaller one leaves
    /// the remainder empty.
    pub fn align_to<T: habiscape_core::RasterElement>(&self, target: &Raster<T>) -> ImpedanceLayer {
        let (rows, cols) = target.shape();
        let (src_rows, src_cols) = self.shape();

        let data: Vec<Option<f64>> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![None; cols];
                for (col, out) in row_data.iter_mut().enumerate() {
                    let (x, y) = target.pixel_to_geo(col, row);
                    let (c, r) = self.transform.geo_to_pixel(x, y);
                    let (c, r) = (c.floor(), r.floor());
                    if c.is_nan() || r.is_nan() || c < 0.0 || r < 0.0 {
                        continue;
                    }
                    let (c, r) = (c as usize, r as usize);
                    if r < src_rows && c < src_cols {
                        *out = self.values[(r, c)];
                    }
                }
                row_data
            })
            .collect();

        let values = Array2::from_shape_vec((rows, cols), data)
            .unwrap_or_else(|_| Array2::from_elem((rows, cols), None));
        Self::new(values, *target.transform(), target.crs().cloned())
    }

    /// Materialise as a raster, writing `nodata` into empty cells
    pub fn to_raster(&self, nodata: f64) -> Result<Raster<f64>> {
        let (rows, cols) = self.shape();
        let data: Vec<f64> = self.values.iter().map(|v| v.unwrap_or(nodata)).collect();
        let mut raster = Raster::from_vec(data, rows, cols)
            .map_err(|e| Error::Other(format!("cannot build raster from layer: {}", e)))?;
        raster.set_transform(self.transform);
        raster.set_crs(self.crs.clone());
        raster.set_nodata(Some(nodata));
        Ok(raster)
    }
}
