//! Weight reconstruction into encoder/decoder factors
//!
//! A reconstructor takes a frozen weight `W ∈ ℝ^(out × in)` and a rank `r` and
//! returns the best rank-`r` approximation of `W` together with the factors
//! `encoder [r, in]` and `decoder [out, r]` whose product reproduces it.

mod config;
mod linalg;
mod svd;

use crate::error::{LoraXsError, Result};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use config::{ReconstrMode, ReconstructConfig, SvdConfig, DEFAULT_LATENT_INIT_SIGMA};
pub use svd::{
    reconstruct, reconstruct_with, truncated_svd, Reconstruction, SigmaPlacement, TruncatedSvd,
    OVERSAMPLES,
};

/// Supported reconstruction methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconstructionMethod {
    /// Randomized truncated SVD
    #[default]
    Svd,
}

impl ReconstructionMethod {
    /// Identifier used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Svd => "svd",
        }
    }
}

impl fmt::Display for ReconstructionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReconstructionMethod {
    type Err = LoraXsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "svd" => Ok(Self::Svd),
            _ => Err(LoraXsError::UnsupportedMethod { method: s.to_string() }),
        }
    }
}

/// Factorizes a weight at a given rank
pub trait Reconstructor {
    /// Reconstruct `weight` at `rank`
    fn reconstruct(&self, weight: ArrayView2<'_, f32>, rank: usize) -> Result<Reconstruction>;
}

/// Randomized SVD reconstructor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvdReconstructor {
    /// Power iterations
    pub n_iter: usize,
    /// Sketch seed
    pub random_state: u64,
    /// Σ split between the factors
    pub placement: SigmaPlacement,
}

impl SvdReconstructor {
    /// Build from the `svd` section of a configuration
    pub fn from_config(svd: &SvdConfig, placement: SigmaPlacement) -> Self {
        Self { n_iter: svd.n_iter, random_state: svd.random_state, placement }
    }
}

impl Reconstructor for SvdReconstructor {
    fn reconstruct(&self, weight: ArrayView2<'_, f32>, rank: usize) -> Result<Reconstruction> {
        reconstruct_with(weight, rank, self.n_iter, self.random_state, self.placement)
    }
}

impl ReconstructConfig {
    /// Reconstructor for `method` built from this configuration
    pub fn reconstructor(&self, method: ReconstructionMethod) -> Result<Box<dyn Reconstructor>> {
        match method {
            ReconstructionMethod::Svd => {
                let svd = self.svd_config(method)?;
                Ok(Box::new(SvdReconstructor::from_config(svd, self.sigma_placement)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::{normal, rng_from_seed};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_method_parse() {
        assert_eq!("svd".parse::<ReconstructionMethod>().unwrap(), ReconstructionMethod::Svd);
        assert_eq!("SVD".parse::<ReconstructionMethod>().unwrap(), ReconstructionMethod::Svd);
    }

    #[test]
    fn test_unknown_method_rejected() {
        let err = "nmf".parse::<ReconstructionMethod>().unwrap_err();
        assert!(matches!(err, LoraXsError::UnsupportedMethod { ref method } if method == "nmf"));
        assert_eq!(err.code(), "X001");
    }

    #[test]
    fn test_method_display_round_trip() {
        let method = ReconstructionMethod::Svd;
        assert_eq!(method.to_string().parse::<ReconstructionMethod>().unwrap(), method);
    }

    #[test]
    fn test_config_reconstructor_matches_free_function() {
        let weight = normal(24, 16, 0.0, 1.0, &mut rng_from_seed(Some(3)));
        let config = ReconstructConfig::default();
        let reconstructor = config.reconstructor(ReconstructionMethod::Svd).unwrap();
        let via_trait = reconstructor.reconstruct(weight.view(), 4).unwrap();
        let svd = config.svd.clone().unwrap();
        let direct = reconstruct(weight.view(), 4, svd.n_iter, svd.random_state).unwrap();
        for (x, y) in via_trait.encoder.iter().zip(direct.encoder.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_reconstructor_without_svd_section() {
        let config = ReconstructConfig { svd: None, ..ReconstructConfig::default() };
        assert!(config.reconstructor(ReconstructionMethod::Svd).is_err());
    }
}
