//! Pixel-wise running maximum of impedance layers

use ndarray::Zip;

use crate::layer::ImpedanceLayer;
use habiscape_core::{Error, Result};

/// Combines per-stressor layers into the strongest effect at each cell.
///
/// The accumulator carries no state of its own: callers thread an
/// `Option<ImpedanceLayer>` through [`MaxAccumulator::update`], starting from
/// `None`.
pub struct MaxAccumulator;

impl MaxAccumulator {
    /// Fold `new` into `current`.
    ///
    /// Where both layers hold a value the larger wins; where only one does,
    /// that one is kept. The result carries `current`'s georeferencing.
    pub fn update(current: Option<ImpedanceLayer>, new: ImpedanceLayer) -> Result<ImpedanceLayer> {
        let Some(current) = current else {
            return Ok(new);
        };

        if current.shape() != new.shape() {
            let (er, ec) = current.shape();
            let (ar, ac) = new.shape();
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }

        let values = Zip::from(current.values())
            .and(new.values())
            .map_collect(|&a, &b| match (a, b) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, None) => a,
                (None, b) => b,
            });

        Ok(ImpedanceLayer::new(
            values,
            *current.transform(),
            current.crs().cloned(),
        ))
    }

    /// Fold a sequence of layers; `None` if it is empty
    pub fn fold<I>(layers: I) -> Result<Option<ImpedanceLayer>>
    where
        I: IntoIterator<Item = ImpedanceLayer>,
    {
        layers
            .into_iter()
            .try_fold(None, |acc, layer| Self::update(acc, layer).map(Some))
    }
}
