//! # Habiscape Impedance
//!
//! Edge-effect impedance surfaces for landscape connectivity models.
//!
//! Every stressor (roads, railways, built-up land-cover classes, ...) raises
//! impedance near itself: the baseline maximum decays with distance from the
//! stressor, exponentially or linearly, and the strongest effect over all
//! stressors is combined with the baseline impedance.
//!
//! ## Modules
//!
//! - `proximity`: Euclidean distance to the nearest stressor cell
//! - `decay`: exponential and proportional decay profiles
//! - `params`: decay parameter lookup in a nested YAML configuration
//! - `accumulator`: pixel-wise maximum over stressors
//! - `finalize`: combine with and cap at the baseline
//! - `pipeline`: orchestration over a set of stressors
//! - `affinity`: reciprocal of an impedance surface
//!
//! ```no_run
//! use habiscape_impedance::prelude::*;
//!
//! # fn main() -> habiscape_core::Result<()> {
//! let config = ConfigNode::from_path("impedance.yaml")?;
//! let stressors = [
//!     Stressor::new("motorway", "stressors/motorway.tif"),
//!     Stressor::new("railways", "stressors/railways.tif"),
//! ];
//! let run = ImpedancePipeline::new(&config).run_from_path("baseline.tif", None, &stressors)?;
//! habiscape_core::io::write_geotiff(&run.impedance, "impedance.tif", None)?;
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod affinity;
pub mod decay;
pub mod finalize;
pub mod layer;
pub(crate) mod maybe_rayon;
pub mod params;
pub mod pipeline;
pub mod proximity;
pub mod source;

pub use maybe_rayon::worker_count;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::accumulator::MaxAccumulator;
    pub use crate::affinity::compute_affinity;
    pub use crate::decay::{apply_decay, DecayProfile, DeclineType};
    pub use crate::finalize::{baseline_maximum, finalize};
    pub use crate::layer::ImpedanceLayer;
    pub use crate::params::{resolve_decay_profile, ConfigNode, ScalarValue, StressorParams};
    pub use crate::pipeline::{
        ImpedancePipeline, ImpedanceRun, IntermediateOutputs, PipelineStage, ProcessingMode,
        Stressor, StressorOutcome, StressorReport,
    };
    pub use crate::proximity::{compute_proximity, distance_sentinel, Proximity};
    pub use crate::source::{GeoTiffSource, MemorySource, RasterSource};
}
