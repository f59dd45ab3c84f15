//! Impedance accumulation over a set of stressors
//!
//! For each stressor: read the raster, compute proximity, resolve its decay
//! profile, decay the baseline maximum by distance and fold the result into a
//! running pixel-wise maximum. The maximum is then combined with the baseline
//! once. Stressors that cannot be read or have no usable parameters are
//! skipped and reported; only a missing baseline aborts a run.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::accumulator::MaxAccumulator;
use crate::decay::apply_decay;
use crate::finalize::{baseline_maximum, finalize};
use crate::layer::ImpedanceLayer;
use crate::params::{resolve_decay_profile, ConfigNode};
use crate::proximity::compute_proximity;
use crate::source::{GeoTiffSource, RasterSource};
use habiscape_core::io::{write_geotiff, GeoTiffOptions};
use habiscape_core::raster::Raster;
use habiscape_core::{Error, Result};

/// A named stressor raster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stressor {
    /// Key used to look up decay parameters
    pub name: String,
    pub path: PathBuf,
}

impl Stressor {
    pub fn new<N: Into<String>, P: Into<PathBuf>>(name: N, path: P) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// How stressors are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// One stressor after another, folded in input order
    Sequential,
    /// All stressors on the global rayon pool
    #[default]
    Parallel,
    /// All stressors on a dedicated pool with this many threads
    ParallelWith(usize),
}

/// Progress notifications emitted during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    LoadingBaseline,
    /// Index into the stressor list
    ProcessingStressor(usize),
    Finalizing,
    Complete,
}

/// Where and how to persist per-stressor rasters
#[derive(Debug, Clone)]
pub struct IntermediateOutputs {
    pub dir: PathBuf,
    pub options: GeoTiffOptions,
}

impl IntermediateOutputs {
    /// Int32, LZW-compressed outputs in `dir`
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            options: GeoTiffOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GeoTiffOptions) -> Self {
        self.options = options;
        self
    }

    /// `<dir>/<stressor>_dist.tif`
    pub fn proximity_path(&self, stressor: &str) -> PathBuf {
        self.dir.join(format!("{}_dist.tif", file_stem(stressor)))
    }

    /// `<dir>/<stressor>_edge.tif`
    pub fn edge_path(&self, stressor: &str) -> PathBuf {
        self.dir.join(format!("{}_edge.tif", file_stem(stressor)))
    }
}

/// Stressor name reduced to a single path component.
///
/// Anything other than ASCII letters, digits, `-` and `_` becomes `_`, so
/// separators and `..` cannot leave the output directory.
fn file_stem(stressor: &str) -> String {
    let stem: String = stressor
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "stressor".to_string()
    } else {
        stem
    }
}

/// What happened to one stressor
#[derive(Debug, Clone, PartialEq)]
pub enum StressorOutcome {
    Applied {
        /// Cells left without a distance to the stressor
        proximity_nodata: usize,
        /// Whether the edge layer had to be resampled onto the baseline grid
        realigned: bool,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StressorReport {
    pub name: String,
    pub outcome: StressorOutcome,
}

impl StressorReport {
    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, StressorOutcome::Applied { .. })
    }
}

impl fmt::Display for StressorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            StressorOutcome::Applied {
                proximity_nodata,
                realigned,
            } => {
                write!(f, "{}: applied", self.name)?;
                if *proximity_nodata > 0 {
                    write!(f, " ({} cells without proximity)", proximity_nodata)?;
                }
                if *realigned {
                    write!(f, " (resampled to baseline grid)")?;
                }
                Ok(())
            }
            StressorOutcome::Skipped { reason } => write!(f, "{}: skipped, {}", self.name, reason),
        }
    }
}

/// Result of [`ImpedancePipeline::run`]
#[derive(Debug, Clone)]
pub struct ImpedanceRun {
    pub impedance: Raster<f64>,
    /// Maximum impedance used for decay and as the cap
    pub baseline_max: f64,
    /// One entry per input stressor, in input order
    pub reports: Vec<StressorReport>,
}

impl ImpedanceRun {
    pub fn applied_count(&self) -> usize {
        self.reports.iter().filter(|r| r.is_applied()).count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &StressorReport> {
        self.reports.iter().filter(|r| !r.is_applied())
    }
}

type Observer = Box<dyn Fn(PipelineStage) + Send + Sync>;

/// Builder and driver for an impedance run
pub struct ImpedancePipeline<'a> {
    config: &'a ConfigNode,
    mode: ProcessingMode,
    intermediates: Option<IntermediateOutputs>,
    source: Box<dyn RasterSource>,
    observer: Option<Observer>,
}

/// Reports and folded layer for a contiguous run of stressors
struct Partial {
    reports: Vec<StressorReport>,
    layer: Option<ImpedanceLayer>,
}

impl Partial {
    fn merge(mut self, other: Partial) -> Result<Partial> {
        self.reports.extend(other.reports);
        let layer = match (self.layer, other.layer) {
            (Some(a), Some(b)) => Some(MaxAccumulator::update(Some(a), b)?),
            (a, None) => a,
            (None, b) => b,
        };
        Ok(Partial {
            reports: self.reports,
            layer,
        })
    }
}

impl<'a> ImpedancePipeline<'a> {
    /// Pipeline reading GeoTIFFs from disk, parallel over stressors
    pub fn new(config: &'a ConfigNode) -> Self {
        Self {
            config,
            mode: ProcessingMode::default(),
            intermediates: None,
            source: Box::new(GeoTiffSource),
            observer: None,
        }
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_intermediates(mut self, intermediates: IntermediateOutputs) -> Self {
        self.intermediates = Some(intermediates);
        self
    }

    pub fn with_source<S: RasterSource + 'static>(mut self, source: S) -> Self {
        self.source = Box::new(source);
        self
    }

    /// Receive a [`PipelineStage`] as the run progresses; may be called from worker threads
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(PipelineStage) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Read the baseline from `baseline_path`, then [`run`](Self::run).
    ///
    /// Failure to read the baseline is returned as an error.
    pub fn run_from_path<P: AsRef<Path>>(
        &self,
        baseline_path: P,
        baseline_max: Option<f64>,
        stressors: &[Stressor],
    ) -> Result<ImpedanceRun> {
        let path = baseline_path.as_ref();
        self.notify(PipelineStage::LoadingBaseline);
        let baseline = self.source.read(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "cannot read baseline impedance");
            e
        })?;
        self.run(&baseline, baseline_max, stressors)
    }

    /// Compute the impedance surface for `stressors` over `baseline`.
    ///
    /// `baseline_max` defaults to the largest valid baseline value.
    pub fn run(
        &self,
        baseline: &Raster<f64>,
        baseline_max: Option<f64>,
        stressors: &[Stressor],
    ) -> Result<ImpedanceRun> {
        let baseline_max = match baseline_max.or_else(|| baseline_maximum(baseline)) {
            Some(m) => m,
            None => {
                return Err(Error::Other(
                    "baseline impedance has no valid cells to take a maximum from".into(),
                ))
            }
        };
        if let Some(out) = &self.intermediates {
            std::fs::create_dir_all(&out.dir)?;
        }

        info!(
            stressors = stressors.len(),
            baseline_max,
            mode = ?self.mode,
            "accumulating impedance"
        );

        let partial = match self.mode {
            ProcessingMode::Sequential => self.run_sequential(baseline, baseline_max, stressors)?,
            ProcessingMode::Parallel => self.run_parallel(baseline, baseline_max, stressors)?,
            ProcessingMode::ParallelWith(threads) => {
                self.run_on_pool(threads, baseline, baseline_max, stressors)?
            }
        };

        self.notify(PipelineStage::Finalizing);
        let impedance = finalize(partial.layer.as_ref(), baseline, baseline_max)?;

        let run = ImpedanceRun {
            impedance,
            baseline_max,
            reports: partial.reports,
        };
        info!(
            applied = run.applied_count(),
            skipped = run.reports.len() - run.applied_count(),
            "impedance accumulation complete"
        );
        self.notify(PipelineStage::Complete);
        Ok(run)
    }

    fn run_sequential(
        &self,
        baseline: &Raster<f64>,
        impedance_max: f64,
        stressors: &[Stressor],
    ) -> Result<Partial> {
        let mut reports = Vec::with_capacity(stressors.len());
        let mut acc = None;
        for (index, stressor) in stressors.iter().enumerate() {
            let (report, layer) = self.process_stressor(index, stressor, baseline, impedance_max);
            reports.push(report);
            if let Some(layer) = layer {
                acc = Some(MaxAccumulator::update(acc, layer)?);
            }
        }
        Ok(Partial {
            reports,
            layer: acc,
        })
    }

    #[cfg(feature = "parallel")]
    fn run_parallel(
        &self,
        baseline: &Raster<f64>,
        impedance_max: f64,
        stressors: &[Stressor],
    ) -> Result<Partial> {
        use rayon::prelude::*;

        stressors
            .par_iter()
            .enumerate()
            .map(|(index, stressor)| {
                let (report, layer) = self.process_stressor(index, stressor, baseline, impedance_max);
                Ok(Partial {
                    reports: vec![report],
                    layer,
                })
            })
            .reduce_with(|a: Result<Partial>, b: Result<Partial>| a?.merge(b?))
            .unwrap_or_else(|| {
                Ok(Partial {
                    reports: Vec::new(),
                    layer: None,
                })
            })
    }

    #[cfg(not(feature = "parallel"))]
    fn run_parallel(
        &self,
        baseline: &Raster<f64>,
        impedance_max: f64,
        stressors: &[Stressor],
    ) -> Result<Partial> {
        self.run_sequential(baseline, impedance_max, stressors)
    }

    #[cfg(feature = "parallel")]
    fn run_on_pool(
        &self,
        threads: usize,
        baseline: &Raster<f64>,
        impedance_max: f64,
        stressors: &[Stressor],
    ) -> Result<Partial> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::Other(format!("failed to build thread pool: {}", e)))?;
        pool.install(|| self.run_parallel(baseline, impedance_max, stressors))
    }

    #[cfg(not(feature = "parallel"))]
    fn run_on_pool(
        &self,
        _threads: usize,
        baseline: &Raster<f64>,
        impedance_max: f64,
        stressors: &[Stressor],
    ) -> Result<Partial> {
        self.run_sequential(baseline, impedance_max, stressors)
    }

    /// Turn one stressor into an edge-effect layer on the baseline grid
    fn process_stressor(
        &self,
        index: usize,
        stressor: &Stressor,
        baseline: &Raster<f64>,
        impedance_max: f64,
    ) -> (StressorReport, Option<ImpedanceLayer>) {
        self.notify(PipelineStage::ProcessingStressor(index));
        let name = stressor.name.as_str();
        let skipped = |reason: String| -> (StressorReport, Option<ImpedanceLayer>) {
            (
                StressorReport {
                    name: name.to_string(),
                    outcome: StressorOutcome::Skipped { reason },
                },
                None,
            )
        };

        let mut raster = match self.source.read(&stressor.path) {
            Ok(r) => r,
            Err(e) => {
                warn!(stressor = name, path = %stressor.path.display(), error = %e, "cannot read stressor raster, skipping");
                return skipped(e.to_string());
            }
        };

        let profile = match resolve_decay_profile(self.config, name) {
            Ok(p) => p,
            Err(e) => {
                error!(stressor = name, error = %e, "no usable decay parameters, skipping");
                return skipped(e.to_string());
            }
        };

        let proximity = match compute_proximity(&mut raster, name) {
            Ok(p) => p,
            Err(e) => {
                warn!(stressor = name, error = %e, "proximity failed, skipping");
                return skipped(e.to_string());
            }
        };
        drop(raster);

        let edge = apply_decay(&proximity.distances, impedance_max, &profile);
        debug!(stressor = name, %profile, affected = edge.valid_count(), "edge effect computed");

        if let Some(out) = &self.intermediates {
            match proximity.to_raster() {
                Ok(r) => self.persist(name, "proximity", &out.proximity_path(name), &r, out),
                Err(e) => warn!(stressor = name, error = %e, "cannot materialise proximity"),
            }
            match edge.to_raster(proximity.nodata) {
                Ok(r) => self.persist(name, "edge effect", &out.edge_path(name), &r, out),
                Err(e) => warn!(stressor = name, error = %e, "cannot materialise edge effect"),
            }
        }

        if let (Some(a), Some(b)) = (edge.crs(), baseline.crs()) {
            if !a.is_equivalent(b) {
                warn!(
                    stressor = name,
                    stressor_crs = %a.identifier(),
                    baseline_crs = %b.identifier(),
                    "stressor CRS differs from the baseline CRS; cells are matched by coordinates only"
                );
            }
        }

        let realigned = !edge.matches_grid(baseline);
        let edge = if realigned {
            warn!(
                stressor = name,
                stressor_shape = ?edge.shape(),
                baseline_shape = ?baseline.shape(),
                "stressor grid differs from the baseline grid; resampling to the baseline extent"
            );
            edge.align_to(baseline)
        } else {
            edge
        };

        (
            StressorReport {
                name: name.to_string(),
                outcome: StressorOutcome::Applied {
                    proximity_nodata: proximity.nodata_cells,
                    realigned,
                },
            },
            Some(edge),
        )
    }

    fn persist(
        &self,
        stressor: &str,
        what: &str,
        path: &Path,
        raster: &Raster<f64>,
        out: &IntermediateOutputs,
    ) {
        match write_geotiff(raster, path, Some(out.options)) {
            Ok(()) => debug!(stressor, path = %path.display(), "wrote {}", what),
            Err(e) => warn!(stressor, path = %path.display(), error = %e, "cannot write {}", what),
        }
    }

    fn notify(&self, stage: PipelineStage) {
        if let Some(observer) = &self.observer {
            observer(stage);
        }
    }
}
