//! YAML run configuration for `habiscape impedance --config`
//!
//! ```yaml
//! baseline: inputs/impedance_lulc_2018.tif
//! baseline_max: 100        # optional, defaults to the baseline maximum
//! impedance_config: impedance.yaml
//! stressors:
//!   motorway: stressors/motorway.tif
//!   stressor_lulc_20_2018: stressors/lulc_20.tif
//! output: output/impedance_2018.tif
//! output_type: int32       # int32 | float32 | float64
//! compression: lzw         # none | lzw | deflate
//! intermediate_dir: output/intermediate
//! threads: 4               # 1 runs sequentially, 0 or absent uses every core
//! ```
//!
//! Relative paths are taken relative to the directory holding the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use habiscape_core::io::{Compression, GeoTiffOptions, PixelType};
use habiscape_impedance::pipeline::{ProcessingMode, Stressor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub baseline: PathBuf,
    #[serde(default)]
    pub baseline_max: Option<f64>,
    pub impedance_config: PathBuf,
    #[serde(default)]
    pub stressors: BTreeMap<String, PathBuf>,
    pub output: PathBuf,
    #[serde(default)]
    pub output_type: PixelType,
    #[serde(default)]
    pub compression: Compression,
    #[serde(default)]
    pub intermediate_dir: Option<PathBuf>,
    #[serde(default)]
    pub threads: Option<usize>,
}

impl RunConfig {
    /// Load from a YAML file, resolving relative paths against its directory
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run configuration {}", path.display()))?;
        let mut config: RunConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid run configuration {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(max) = self.baseline_max {
            if !(max.is_finite() && max > 0.0) {
                bail!("baseline_max must be a positive number, got {}", max);
            }
        }
        if let Some((name, _)) = self.stressors.iter().find(|(name, _)| name.trim().is_empty()) {
            bail!("stressor names must not be empty (got {:?})", name);
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.baseline);
        resolve(&mut self.impedance_config);
        resolve(&mut self.output);
        self.stressors.values_mut().for_each(|p| resolve(p));
        if let Some(dir) = self.intermediate_dir.as_mut() {
            resolve(dir);
        }
    }

    pub fn stressor_list(&self) -> Vec<Stressor> {
        self.stressors
            .iter()
            .map(|(name, path)| Stressor::new(name.clone(), path.clone()))
            .collect()
    }

    pub fn processing_mode(&self) -> ProcessingMode {
        match self.threads {
            None | Some(0) => ProcessingMode::Parallel,
            Some(1) => ProcessingMode::Sequential,
            Some(n) => ProcessingMode::ParallelWith(n),
        }
    }

    pub fn output_options(&self) -> GeoTiffOptions {
        GeoTiffOptions::new(self.output_type, self.compression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN: &str = r#"
baseline: inputs/baseline.tif
impedance_config: /etc/habiscape/impedance.yaml
stressors:
  motorway: stressors/motorway.tif
  railways: stressors/railways.tif
output: out/impedance.tif
output_type: float32
threads: 1
"#;

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, RUN).unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.baseline, dir.path().join("inputs/baseline.tif"));
        assert_eq!(config.impedance_config, PathBuf::from("/etc/habiscape/impedance.yaml"));
        assert_eq!(config.stressors["railways"], dir.path().join("stressors/railways.tif"));
        assert_eq!(config.output_type, PixelType::Float32);
        assert_eq!(config.compression, Compression::Lzw);
        assert_eq!(config.processing_mode(), ProcessingMode::Sequential);
        assert_eq!(config.stressor_list().len(), 2);
    }

    #[test]
    fn test_defaults() {
        let config: RunConfig = serde_yaml::from_str(
            "baseline: b.tif\nimpedance_config: i.yaml\noutput: o.tif\n",
        )
        .unwrap();
        assert!(config.stressors.is_empty());
        assert_eq!(config.output_type, PixelType::Int32);
        assert_eq!(config.processing_mode(), ProcessingMode::Parallel);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_fields_and_bad_max() {
        assert!(serde_yaml::from_str::<RunConfig>(
            "baseline: b.tif\nimpedance_config: i.yaml\noutput: o.tif\nlulc: x\n"
        )
        .is_err());

        let config: RunConfig = serde_yaml::from_str(
            "baseline: b.tif\nimpedance_config: i.yaml\noutput: o.tif\nbaseline_max: -1\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
