//! Reconstruction configuration
//!
//! Mirrors `config/reconstruct_config.yaml`:
//!
//! ```yaml
//! reconstr_mode: separated
//! half_init_dec: false
//! replacement_module_random_init: false
//! r_squared: true
//! svd:
//!   n_iter: 10
//!   random_state: 42
//! ```

use super::svd::SigmaPlacement;
use super::ReconstructionMethod;
use crate::error::{LoraXsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Default standard deviation of the latent matrix initialization
pub const DEFAULT_LATENT_INIT_SIGMA: f32 = 1e-5;

/// How factors are reconstructed across a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconstrMode {
    /// Each target weight is factorized on its own
    Separated,
}

/// Settings for the truncated SVD
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvdConfig {
    /// Target rank; falls back to the adapter's `r` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
    /// Power iterations of the randomized range finder
    #[serde(default = "default_n_iter")]
    pub n_iter: usize,
    /// Seed of the Gaussian sketch
    #[serde(default)]
    pub random_state: u64,
}

fn default_n_iter() -> usize {
    10
}

fn default_mode() -> String {
    "separated".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sigma() -> f32 {
    DEFAULT_LATENT_INIT_SIGMA
}

impl Default for SvdConfig {
    fn default() -> Self {
        Self { rank: None, n_iter: default_n_iter(), random_state: 0 }
    }
}

/// Full reconstruction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructConfig {
    /// Re-draw the trailing half of the decoder's rank components
    #[serde(default)]
    pub half_init_dec: bool,

    /// Ignore the SVD and draw both factors from Kaiming-uniform
    #[serde(default)]
    pub replacement_module_random_init: bool,

    /// Reconstruction mode (only `separated`)
    #[serde(default = "default_mode")]
    pub reconstr_mode: String,

    /// Freeze A/B and train an r×r latent matrix between them
    #[serde(default = "default_true")]
    pub r_squared: bool,

    /// SVD sub-configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svd: Option<SvdConfig>,

    /// Per-module rank, keyed by fully qualified module name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rank_overrides: BTreeMap<String, usize>,

    /// Standard deviation of the latent (and non-r-squared encoder) draw
    #[serde(default = "default_sigma")]
    pub latent_init_sigma: f32,

    /// Seed for re-initialization draws; OS entropy when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_seed: Option<u64>,

    /// Σ split between encoder and decoder
    #[serde(default)]
    pub sigma_placement: SigmaPlacement,
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            half_init_dec: false,
            replacement_module_random_init: false,
            reconstr_mode: default_mode(),
            r_squared: true,
            svd: Some(SvdConfig::default()),
            rank_overrides: BTreeMap::new(),
            latent_init_sigma: DEFAULT_LATENT_INIT_SIGMA,
            init_seed: None,
            sigma_placement: SigmaPlacement::default(),
        }
    }
}

impl ReconstructConfig {
    /// Parse from a YAML string and validate
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| LoraXsError::ConfigParsing {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file and validate
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|e| {
            LoraXsError::io(format!("failed to read config file {}", path.display()), e)
        })?;
        let config: Self = serde_yaml::from_str(&yaml).map_err(|e| LoraXsError::ConfigParsing {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            LoraXsError::config_value("config", e.to_string(), "Report this as a bug")
        })
    }

    /// Check every value that does not depend on the model
    pub fn validate(&self) -> Result<()> {
        self.mode()?;
        if !(self.latent_init_sigma.is_finite() && self.latent_init_sigma > 0.0) {
            return Err(LoraXsError::config_value(
                "latent_init_sigma",
                format!("must be a positive finite number, got {}", self.latent_init_sigma),
                "Use a small value such as 1e-5",
            ));
        }
        if let Some(SvdConfig { rank: Some(0), .. }) = self.svd {
            return Err(LoraXsError::config_value(
                "svd.rank",
                "rank must be at least 1",
                "Remove svd.rank to use the adapter's r",
            ));
        }
        if let Some((name, _)) = self.rank_overrides.iter().find(|(_, &rank)| rank == 0) {
            return Err(LoraXsError::config_value(
                format!("rank_overrides.{name}"),
                "rank must be at least 1",
                "Remove the override or give a positive rank",
            ));
        }
        Ok(())
    }

    /// Parsed reconstruction mode
    pub fn mode(&self) -> Result<ReconstrMode> {
        match self.reconstr_mode.as_str() {
            "separated" => Ok(ReconstrMode::Separated),
            other => Err(LoraXsError::UnsupportedMode { mode: other.to_string() }),
        }
    }

    /// Sub-configuration for `method`
    pub fn svd_config(&self, method: ReconstructionMethod) -> Result<&SvdConfig> {
        match method {
            ReconstructionMethod::Svd => self.svd.as_ref().ok_or_else(|| {
                LoraXsError::config_value(
                    "svd",
                    "reconstruction method 'svd' selected but no svd section is configured",
                    "Add `svd: { n_iter: 10, random_state: 42 }`",
                )
            }),
        }
    }

    /// Rank for the module named `module`
    ///
    /// Resolution order: `rank_overrides[module]`, then `svd.rank`, then
    /// `adapter_rank`.
    pub fn rank_for(&self, module: &str, adapter_rank: usize) -> usize {
        self.rank_overrides
            .get(module)
            .copied()
            .or_else(|| self.svd.as_ref().and_then(|svd| svd.rank))
            .unwrap_or(adapter_rank)
    }

    /// Builder: set the SVD rank
    #[must_use]
    pub fn with_rank(mut self, rank: usize) -> Self {
        self.svd.get_or_insert_with(SvdConfig::default).rank = Some(rank);
        self
    }

    /// Builder: override the rank of one module
    #[must_use]
    pub fn with_rank_override(mut self, module: impl Into<String>, rank: usize) -> Self {
        self.rank_overrides.insert(module.into(), rank);
        self
    }

    /// Builder: fix the re-initialization seed
    #[must_use]
    pub fn with_init_seed(mut self, seed: u64) -> Self {
        self.init_seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ORIGINAL_SHAPE: &str = r"
reconstr_mode: separated
half_init_dec: False
replacement_module_random_init: False
r_squared: True
svd:
  n_iter: 10
  random_state: 42
";

    #[test]
    fn test_parse_original_layout() {
        let config = ReconstructConfig::from_yaml_str(ORIGINAL_SHAPE).unwrap();
        assert_eq!(config.mode().unwrap(), ReconstrMode::Separated);
        assert!(!config.half_init_dec);
        assert!(config.r_squared);
        let svd = config.svd_config(ReconstructionMethod::Svd).unwrap();
        assert_eq!(svd.n_iter, 10);
        assert_eq!(svd.random_state, 42);
        assert_eq!(svd.rank, None);
        assert_eq!(config.latent_init_sigma, DEFAULT_LATENT_INIT_SIGMA);
        assert_eq!(config.sigma_placement, SigmaPlacement::Encoder);
    }

    #[test]
    fn test_unsupported_mode_rejected() {
        let yaml = "reconstr_mode: joint\nsvd: { n_iter: 2 }\n";
        let err = ReconstructConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, LoraXsError::UnsupportedMode { ref mode } if mode == "joint"));
    }

    #[test]
    fn test_missing_svd_section() {
        let config = ReconstructConfig { svd: None, ..ReconstructConfig::default() };
        let err = config.svd_config(ReconstructionMethod::Svd).unwrap_err();
        assert_eq!(err.code(), "X030");
    }

    #[test]
    fn test_rank_resolution_order() {
        let config = ReconstructConfig::default();
        assert_eq!(config.rank_for("encoder.query", 4), 4);

        let config = config.with_rank(6);
        assert_eq!(config.rank_for("encoder.query", 4), 6);

        let config = config.with_rank_override("encoder.layer.1.query", 8);
        assert_eq!(config.rank_for("encoder.layer.1.query", 4), 8);
        assert_eq!(config.rank_for("encoder.layer.2.query", 4), 6);
    }

    #[test]
    fn test_zero_override_rejected() {
        let config = ReconstructConfig::default().with_rank_override("q", 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_sigma_rejected() {
        let config = ReconstructConfig { latent_init_sigma: 0.0, ..ReconstructConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip_with_extensions() {
        let config = ReconstructConfig::default()
            .with_rank(4)
            .with_rank_override("encoder.layer.1.attention.self.query", 8)
            .with_init_seed(7);
        let yaml = config.to_yaml().unwrap();
        let parsed = ReconstructConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ORIGINAL_SHAPE.as_bytes()).unwrap();
        let config = ReconstructConfig::from_file(file.path()).unwrap();
        assert_eq!(config.svd.unwrap().random_state, 42);
    }

    #[test]
    fn test_from_missing_file() {
        let err = ReconstructConfig::from_file("/nonexistent/reconstruct.yaml").unwrap_err();
        assert!(matches!(err, LoraXsError::Io { .. }));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = ReconstructConfig::from_yaml_str("svd: [").unwrap_err();
        assert!(matches!(err, LoraXsError::ConfigParsing { .. }));
    }
}
