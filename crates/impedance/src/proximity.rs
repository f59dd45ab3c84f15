//! Euclidean proximity to stressor cells
//!
//! Exact distance transform in map units: every cell gets the distance from
//! its centre to the centre of the nearest source cell. Source cells are
//! those holding a valid, non-zero value (rasterised roads, masked land-cover
//! classes, ...).
//!
//! Uses the separable lower-envelope-of-parabolas transform (Felzenszwalb &
//! Huttenlocher): one 1D pass down every column, then one along every row,
//! each O(n). Pixel width and height are applied separately so non-square
//! cells are measured correctly.

use ndarray::Array2;
use tracing::{debug, warn};

use crate::layer::ImpedanceLayer;
use crate::maybe_rayon::*;
use habiscape_core::raster::{Raster, DEFAULT_NODATA};
use habiscape_core::{Error, Result};

/// Output of [`compute_proximity`]
#[derive(Debug, Clone)]
pub struct Proximity {
    /// Distance to the nearest source, on the stressor grid; `None` where no source is reachable
    pub distances: ImpedanceLayer,
    /// Number of cells left without a distance
    pub nodata_cells: usize,
    /// Value written into empty cells when the distances are persisted
    pub nodata: f64,
}

impl Proximity {
    /// Whether every cell received a distance
    pub fn is_complete(&self) -> bool {
        self.nodata_cells == 0
    }

    /// Distances as a raster, with [`Proximity::nodata`] in unreachable cells
    pub fn to_raster(&self) -> Result<Raster<f64>> {
        self.distances.to_raster(self.nodata)
    }
}

/// Sentinel for persisted distances.
///
/// Distances are never negative, so the stressor's own no-data value is kept
/// when it is negative or NaN. Anything else could collide with a real
/// distance and is replaced by [`DEFAULT_NODATA`].
pub fn distance_sentinel(stressor_nodata: f64) -> f64 {
    if stressor_nodata.is_nan() || stressor_nodata < 0.0 {
        stressor_nodata
    } else {
        DEFAULT_NODATA
    }
}

/// Compute the distance from every cell to the nearest source cell.
///
/// A stressor without a no-data value is tagged with [`DEFAULT_NODATA`]
/// first. Unreachable cells are `None` in the result; see
/// [`distance_sentinel`] for the value they take on disk. `label` names the
/// stressor in log messages.
///
/// A raster without any source cell yields an all-no-data result and a
/// warning: it usually means the vector data behind the stressor was empty
/// or invalid.
pub fn compute_proximity(stressor: &mut Raster<f64>, label: &str) -> Result<Proximity> {
    let nodata = stressor.nodata_or_insert(DEFAULT_NODATA);
    let (rows, cols) = stressor.shape();
    let sx = stressor.transform().x_spacing();
    let sy = stressor.transform().y_spacing();

    for (name, spacing) in [("pixel_width", sx), ("pixel_height", sy)] {
        if !(spacing.is_finite() && spacing > 0.0) {
            return Err(Error::InvalidParameter {
                name,
                value: spacing.to_string(),
                reason: format!("stressor raster {} has a degenerate geotransform", label),
            });
        }
    }

    let source = &*stressor;
    let is_source = |row: usize, col: usize| {
        let v = source.data()[(row, col)];
        !source.is_nodata(v) && v != 0.0
    };

    // Column pass: squared vertical distance to the nearest source in each column
    let columns: Vec<Vec<f64>> = (0..cols)
        .into_par_iter()
        .map(|col| {
            let f: Vec<f64> = (0..rows)
                .map(|row| if is_source(row, col) { 0.0 } else { f64::INFINITY })
                .collect();
            squared_distance_1d(&f, sy)
        })
        .collect();

    // Row pass over the column results
    let squared: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let f: Vec<f64> = columns.iter().map(|column| column[row]).collect();
            squared_distance_1d(&f, sx)
        })
        .collect();

    let nodata_cells = squared.iter().filter(|d2| !d2.is_finite()).count();
    let values: Vec<Option<f64>> = squared
        .into_iter()
        .map(|d2| d2.is_finite().then(|| d2.sqrt()))
        .collect();
    let values =
        Array2::from_shape_vec((rows, cols), values).map_err(|e| Error::Other(e.to_string()))?;
    let distances = ImpedanceLayer::new(values, *stressor.transform(), stressor.crs().cloned());

    if nodata_cells > 0 {
        warn!(
            stressor = label,
            nodata_cells,
            "no-data values detected in the proximity raster; check the validity of the input vector data"
        );
    } else {
        debug!(stressor = label, rows, cols, "proximity computed");
    }

    Ok(Proximity {
        distances,
        nodata_cells,
        nodata: distance_sentinel(nodata),
    })
}

/// 1D squared distance transform of a sampled function.
///
/// Returns `d[p] = min_q (spacing * (p - q))^2 + f[q]`. Infinite entries of
/// `f` are not sources; if all are infinite the result is all infinite.
fn squared_distance_1d(f: &[f64], spacing: f64) -> Vec<f64> {
    let n = f.len();
    let s2 = spacing * spacing;
    let height = |q: usize| f[q] + s2 * (q as f64) * (q as f64);

    // Parabola vertices and the left boundary of each one's region
    let mut vertex = vec![0usize; n];
    let mut boundary = vec![0.0f64; n + 1];
    let mut count = 0usize;

    for q in (0..n).filter(|&q| f[q].is_finite()) {
        let hq = height(q);
        let mut sect = f64::NEG_INFINITY;
        while count > 0 {
            let p = vertex[count - 1];
            sect = (hq - height(p)) / (2.0 * s2 * (q - p) as f64);
            if sect <= boundary[count - 1] {
                count -= 1;
                sect = f64::NEG_INFINITY;
            } else {
                break;
            }
        }
        vertex[count] = q;
        boundary[count] = sect;
        count += 1;
        boundary[count] = f64::INFINITY;
    }

    if count == 0 {
        return vec![f64::INFINITY; n];
    }

    let mut j = 0;
    (0..n)
        .map(|p| {
            while boundary[j + 1] < p as f64 {
                j += 1;
            }
            let q = vertex[j];
            let dx = (p as f64 - q as f64) * spacing;
            dx * dx + f[q]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use habiscape_core::GeoTransform;

    fn stressor(rows: usize, cols: usize, cell: f64, sources: &[(usize, usize)]) -> Raster<f64> {
        let mut r = Raster::new(rows, cols);
        r.set_transform(GeoTransform::new(0.0, rows as f64 * cell, cell, -cell));
        for &(row, col) in sources {
            r.set(row, col, 1.0).unwrap();
        }
        r
    }

    fn brute_force(r: &Raster<f64>, row: usize, col: usize) -> f64 {
        let (rows, cols) = r.shape();
        let (sx, sy) = (r.transform().x_spacing(), r.transform().y_spacing());
        let mut best = f64::INFINITY;
        for rr in 0..rows {
            for cc in 0..cols {
                let v = r.get(rr, cc).unwrap();
                if v != 0.0 && !r.is_nodata(v) {
                    let dx = (cc as f64 - col as f64) * sx;
                    let dy = (rr as f64 - row as f64) * sy;
                    best = best.min((dx * dx + dy * dy).sqrt());
                }
            }
        }
        best
    }

    #[test]
    fn test_single_source_corner() {
        let mut r = stressor(4, 4, 1.0, &[(0, 0)]);
        let prox = compute_proximity(&mut r, "roads").unwrap();

        assert!(prox.is_complete());
        assert_relative_eq!(prox.distances.get(0, 0).unwrap(), 0.0);
        assert_relative_eq!(prox.distances.get(0, 3).unwrap(), 3.0);
        assert_relative_eq!(prox.distances.get(3, 3).unwrap(), 18f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_distance_in_map_units() {
        let mut r = stressor(5, 5, 25.0, &[(2, 2)]);
        let prox = compute_proximity(&mut r, "railways").unwrap();

        assert_relative_eq!(prox.distances.get(2, 4).unwrap(), 50.0);
        assert_relative_eq!(prox.distances.get(0, 0).unwrap(), (2.0 * 50f64.powi(2)).sqrt(), epsilon = 1e-9);
        assert_eq!(prox.distances.transform(), r.transform());
    }

    #[test]
    fn test_matches_brute_force() {
        let sources = [(0, 7), (3, 1), (8, 8), (5, 4), (9, 0)];
        let mut r = stressor(10, 12, 10.0, &sources);
        // anisotropic cells
        r.set_transform(GeoTransform::new(0.0, 0.0, 10.0, -30.0));
        let prox = compute_proximity(&mut r, "mixed").unwrap();

        for row in 0..10 {
            for col in 0..12 {
                assert_relative_eq!(
                    prox.distances.get(row, col).unwrap(),
                    brute_force(&r, row, col),
                    epsilon = 1e-9
                );
            }
        }
    }

    #[test]
    fn test_nodata_cells_are_not_sources() {
        let mut r = stressor(1, 5, 1.0, &[(0, 4)]);
        r.set_nodata(Some(-9999.0));
        r.set(0, 0, -9999.0).unwrap();
        let prox = compute_proximity(&mut r, "lulc").unwrap();

        assert_relative_eq!(prox.distances.get(0, 0).unwrap(), 4.0);
    }

    #[test]
    fn test_missing_nodata_is_tagged() {
        let mut r = stressor(3, 3, 1.0, &[(1, 1)]);
        assert_eq!(r.nodata(), None);
        let prox = compute_proximity(&mut r, "water").unwrap();

        assert_eq!(r.nodata(), Some(DEFAULT_NODATA));
        assert_eq!(prox.nodata, DEFAULT_NODATA);
    }

    #[test]
    fn test_empty_stressor_is_all_nodata() {
        let mut r = stressor(3, 4, 1.0, &[]);
        let prox = compute_proximity(&mut r, "empty").unwrap();

        assert!(!prox.is_complete());
        assert_eq!(prox.nodata_cells, 12);
        assert_eq!(prox.distances.get(1, 1), None);
        assert_eq!(prox.to_raster().unwrap().get(1, 1).unwrap(), DEFAULT_NODATA);
    }

    #[test]
    fn test_zero_nodata_keeps_source_distance() {
        // rail rasters are burnt with nodata 0
        let mut r = stressor(1, 4, 1.0, &[(0, 0)]);
        r.set_nodata(Some(0.0));
        let prox = compute_proximity(&mut r, "railways").unwrap();

        assert!(prox.is_complete());
        assert_eq!(prox.distances.get(0, 0), Some(0.0));
        assert_eq!(prox.nodata, DEFAULT_NODATA);
        let written = prox.to_raster().unwrap();
        assert_eq!(written.get(0, 0).unwrap(), 0.0);
        assert!(!written.is_nodata(0.0));
    }

    #[test]
    fn test_distance_sentinel() {
        assert_eq!(distance_sentinel(-9999.0), -9999.0);
        assert_eq!(distance_sentinel(-1.0), -1.0);
        assert!(distance_sentinel(f64::NAN).is_nan());
        assert_eq!(distance_sentinel(0.0), DEFAULT_NODATA);
        assert_eq!(distance_sentinel(255.0), DEFAULT_NODATA);
    }

    #[test]
    fn test_degenerate_transform_rejected() {
        let mut r = stressor(2, 2, 1.0, &[(0, 0)]);
        r.set_transform(GeoTransform::new(0.0, 0.0, 0.0, -1.0));
        assert!(compute_proximity(&mut r, "broken").is_err());
    }
}
