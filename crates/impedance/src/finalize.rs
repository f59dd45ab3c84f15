//! Combine the accumulated edge effect with the baseline impedance

use tracing::{debug, warn};

use crate::layer::ImpedanceLayer;
use crate::maybe_rayon::*;
use habiscape_core::raster::{Raster, DEFAULT_NODATA};
use habiscape_core::{Error, Result};

/// Largest valid value of the baseline, if it has any
pub fn baseline_maximum(baseline: &Raster<f64>) -> Option<f64> {
    baseline.statistics().max
}

/// Produce the final impedance surface.
///
/// Each baseline cell becomes `min(max(edge, baseline), baseline_max)`,
/// with `edge` taken from `accumulated` where it holds a value. Baseline
/// no-data cells stay no-data. The result uses the baseline's grid, CRS and
/// no-data value (`-9999` if the baseline has none).
///
/// An accumulated layer on a different grid is resampled onto the baseline
/// grid first; baseline cells it does not cover get no edge effect.
pub fn finalize(
    accumulated: Option<&ImpedanceLayer>,
    baseline: &Raster<f64>,
    baseline_max: f64,
) -> Result<Raster<f64>> {
    if !baseline_max.is_finite() {
        return Err(Error::InvalidParameter {
            name: "baseline_max",
            value: baseline_max.to_string(),
            reason: "must be finite".into(),
        });
    }

    let aligned;
    let edge = match accumulated {
        Some(layer) if !layer.matches_grid(baseline) => {
            warn!(
                accumulated = ?layer.shape(),
                baseline = ?baseline.shape(),
                "accumulated impedance does not match the baseline grid; resampling to the baseline extent"
            );
            aligned = layer.align_to(baseline);
            Some(&aligned)
        }
        other => other,
    };

    let (rows, cols) = baseline.shape();
    let nodata = baseline.nodata().unwrap_or(DEFAULT_NODATA);

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![nodata; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let base = baseline.data()[(row, col)];
                if baseline.is_nodata(base) {
                    continue;
                }
                let combined = match edge.and_then(|e| e.get(row, col)) {
                    Some(v) => v.max(base),
                    None => base,
                };
                *out = combined.min(baseline_max);
            }
            row_data
        })
        .collect();

    let mut output = Raster::from_vec(data, rows, cols)?;
    output.set_transform(*baseline.transform());
    output.set_crs(baseline.crs().cloned());
    output.set_nodata(Some(nodata));

    debug!(rows, cols, baseline_max, "impedance finalized");
    Ok(output)
}
