//! Affinity surface: the reciprocal of impedance

use ndarray::Array2;
use tracing::debug;

use crate::maybe_rayon::*;
use habiscape_core::raster::Raster;
use habiscape_core::{Error, Result};

/// `1 / impedance` for every valid, non-zero cell.
///
/// No-data and zero cells are copied through unchanged. The result keeps the
/// input's grid, CRS and no-data value.
pub fn compute_affinity(impedance: &Raster<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = impedance.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let v = impedance.data()[(row, col)];
                    if impedance.is_nodata(v) || v == 0.0 {
                        v
                    } else {
                        1.0 / v
                    }
                })
                .collect::<Vec<f64>>()
        })
        .collect();

    let mut affinity = impedance.with_same_meta::<f64>(rows, cols);
    affinity.set_nodata(impedance.nodata());
    *affinity.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;

    debug!(rows, cols, "affinity computed");
    Ok(affinity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reciprocal() {
        let mut r = Raster::from_vec(vec![4.0, 0.0, -9999.0, 100.0], 2, 2).unwrap();
        r.set_nodata(Some(-9999.0));
        let a = compute_affinity(&r).unwrap();

        assert_relative_eq!(a.get(0, 0).unwrap(), 0.25);
        assert_eq!(a.get(0, 1).unwrap(), 0.0);
        assert_eq!(a.get(1, 0).unwrap(), -9999.0);
        assert_relative_eq!(a.get(1, 1).unwrap(), 0.01);
        assert_eq!(a.nodata(), Some(-9999.0));
    }
}
