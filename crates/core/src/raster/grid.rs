//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement, DEFAULT_NODATA};
use ndarray::Array2;

/// A georeferenced 2D raster grid.
///
/// Values are stored row-major as `(row, col)`. The no-data value is
/// optional; callers that need one decide the default (see
/// [`Raster::nodata_or_insert`]).
///
/// # Example
///
/// ```ignore
/// use habiscape_core::Raster;
///
/// let mut roads: Raster<f64> = Raster::new(4, 4);
/// roads.set(0, 0, 1.0)?;
/// assert_eq!(roads.get(0, 0)?, 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    data: Array2<T>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray with default georeferencing
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Zero-filled raster of another cell type sharing this raster's
    /// transform and CRS. The no-data value is left unset.
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            data: Array2::zeros((rows, cols)),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        let (rows, cols) = self.shape();
        match self.data.get_mut((row, col)) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Error::IndexOutOfBounds { row, col, rows, cols }),
        }
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Return the no-data value, tagging the raster with `default` first if
    /// it has none.
    pub fn nodata_or_insert(&mut self, default: T) -> T {
        *self.nodata.get_or_insert(default)
    }

    /// Map bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Map coordinates of the centre of pixel (col, row)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Check if a value is no-data
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Number of no-data cells
    pub fn count_nodata(&self) -> usize {
        self.data.iter().filter(|&&v| self.is_nodata(v)).count()
    }

    /// Convert to another cell type.
    ///
    /// No-data cells become `nodata` (or the converted source no-data when
    /// `nodata` is `None`); fails if a valid value does not fit in `U`. A NaN
    /// source no-data has no integer form and becomes [`DEFAULT_NODATA`].
    pub fn cast<U: RasterElement>(&self, nodata: Option<U>) -> Result<Raster<U>> {
        let target_nodata = match nodata {
            Some(nd) => Some(nd),
            None => match self.nodata {
                Some(nd) => Some(convert_nodata::<U>(nd.as_f64()).ok_or_else(|| {
                    Error::UnsupportedDataType(format!(
                        "no-data value {:?} does not fit the target type",
                        nd
                    ))
                })?),
                None => None,
            },
        };

        // Without a sentinel, float targets keep NaN and integer targets get 0
        let fill = target_nodata
            .or_else(|| U::from_f64(f64::NAN))
            .unwrap_or_else(U::zero);

        let mut data = Vec::with_capacity(self.len());
        for &value in self.data.iter() {
            if self.is_nodata(value) {
                data.push(fill);
                continue;
            }
            let converted = U::from_f64(value.as_f64()).ok_or_else(|| {
                Error::UnsupportedDataType(format!("value {:?} does not fit the target type", value))
            })?;
            data.push(converted);
        }

        let mut out = Raster::from_vec(data, self.rows(), self.cols())?;
        out.transform = self.transform;
        out.crs = self.crs.clone();
        out.nodata = target_nodata;
        Ok(out)
    }

    /// Basic statistics over valid cells
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum = 0.0;
        let mut count = 0usize;

        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }
            if min.map_or(true, |m| value < m) {
                min = Some(value);
            }
            if max.map_or(true, |m| value > m) {
                max = Some(value);
            }
            sum += value.as_f64();
            count += 1;
        }

        RasterStatistics {
            min,
            max,
            mean: (count > 0).then(|| sum / count as f64),
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

fn convert_nodata<U: RasterElement>(nodata: f64) -> Option<U> {
    match U::from_f64(nodata) {
        Some(v) => Some(v),
        None if nodata.is_nan() => U::from_f64(DEFAULT_NODATA),
        None => None,
    }
}
