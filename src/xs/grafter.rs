//! Grafting reconstructed factors into a LoRA layer

use crate::error::{LoraXsError, Result};
use crate::init::{kaiming_uniform_, normal};
use crate::lora::{LoraBranch, LoraLinear};
use crate::nn::Module;
use crate::reconstruct::{ReconstructConfig, Reconstruction};
use crate::tensor::Tensor;
use ndarray::s;
use rand::Rng;

/// How the reconstructed factors are turned into adapter weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraftPolicy {
    /// Re-draw the trailing half of the decoder's rank components
    pub half_init_dec: bool,
    /// Replace both factors with Kaiming-uniform draws
    pub random_init: bool,
    /// Keep the encoder as A; otherwise A gets a small Gaussian draw
    pub r_squared: bool,
    /// Standard deviation of the Gaussian A when not in r-squared mode
    pub encoder_sigma: f32,
}

impl GraftPolicy {
    pub fn from_config(config: &ReconstructConfig) -> Self {
        Self {
            half_init_dec: config.half_init_dec,
            random_init: config.replacement_module_random_init,
            r_squared: config.r_squared,
            encoder_sigma: config.latent_init_sigma,
        }
    }
}

impl Default for GraftPolicy {
    fn default() -> Self {
        Self::from_config(&ReconstructConfig::default())
    }
}

/// Check that `module` can take adapter `adapter` through a graft
///
/// Returns the LoRA layer on success. Quantized layers and anything that is
/// not a LoRA linear are rejected, as is a branch already routed through a
/// latent matrix.
pub fn check_target<'a>(name: &str, module: &'a Module, adapter: &str) -> Result<&'a LoraLinear> {
    let Module::Lora(layer) = module else {
        return Err(LoraXsError::UnsupportedTargetType {
            module: name.to_string(),
            kind: module.kind().to_string(),
        });
    };
    match layer.adapter(adapter) {
        None => Err(LoraXsError::AdapterNotAttached {
            module: name.to_string(),
            adapter: adapter.to_string(),
        }),
        Some(branch) if branch.is_latent() => Err(LoraXsError::AlreadyLatent {
            module: name.to_string(),
            adapter: adapter.to_string(),
        }),
        Some(_) => Ok(layer),
    }
}

/// Replace adapter `adapter`'s A/B with the reconstructed factors
///
/// B always becomes a fresh parameter holding the decoder `[out, r]`. A
/// becomes the encoder `[r, in]` in r-squared mode and a Gaussian draw of
/// the same shape otherwise. Every `lora_*` tensor of the adapter then moves
/// to the base weight's device.
pub fn graft<R: Rng>(
    name: &str,
    target: &mut LoraLinear,
    adapter: &str,
    factors: Reconstruction,
    policy: &GraftPolicy,
    rng: &mut R,
) -> Result<()> {
    let device = target.weight().device();
    let (d_out, d_in) = (target.out_features(), target.in_features());
    let Reconstruction { mut encoder, mut decoder, .. } = factors;
    let rank = encoder.nrows();
    if encoder.ncols() != d_in || decoder.dim() != (d_out, rank) {
        return Err(LoraXsError::ShapeMismatch {
            context: format!("factors for '{name}'"),
            expected: vec![d_out, rank, d_in],
            actual: vec![decoder.nrows(), decoder.ncols(), encoder.ncols()],
        });
    }

    if policy.half_init_dec {
        let keep = rank.div_ceil(2);
        kaiming_uniform_(decoder.slice_mut(s![.., keep..]), d_out, rng);
    }
    if policy.random_init {
        kaiming_uniform_(encoder.view_mut(), rank, rng);
        kaiming_uniform_(decoder.view_mut(), d_out, rng);
    }

    let lora_b = Tensor::new(decoder, true);
    let lora_a = if policy.r_squared {
        Tensor::new(encoder, true)
    } else {
        Tensor::new(normal(rank, d_in, 0.0, f64::from(policy.encoder_sigma), rng), true)
    };

    let branch = target.adapter_mut(adapter).ok_or_else(|| LoraXsError::AdapterNotAttached {
        module: name.to_string(),
        adapter: adapter.to_string(),
    })?;
    let LoraBranch::LowRank(low_rank) = &mut *branch else {
        return Err(LoraXsError::AlreadyLatent {
            module: name.to_string(),
            adapter: adapter.to_string(),
        });
    };
    low_rank.replace_factors(lora_a, lora_b)?;
    branch.to_device(device);

    tracing::debug!(module = name, adapter, rank, ?device, "grafted factors");
    Ok(())
}
