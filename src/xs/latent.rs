//! Latent matrix installation
//!
//! Inserts the trainable `r × r` matrix `M` between the frozen factors so
//! the adapter computes `y = base(x) + scaling · B·M·A·x`.

use crate::error::{LoraXsError, Result};
use crate::init::normal;
use crate::lora::LoraLinear;
use crate::tensor::Tensor;
use rand::Rng;

/// Route adapter `adapter` of `target` through a fresh `[rank, rank]` matrix
///
/// Entries are drawn from `N(0, init_sigma²)` so the adapter starts close to
/// the base layer. The matrix lands on `lora_A`'s device; A and B are frozen.
pub fn install_latent<R: Rng>(
    name: &str,
    target: &mut LoraLinear,
    adapter: &str,
    rank: usize,
    init_sigma: f32,
    rng: &mut R,
) -> Result<()> {
    let branch = target.adapter(adapter).ok_or_else(|| LoraXsError::AdapterNotAttached {
        module: name.to_string(),
        adapter: adapter.to_string(),
    })?;
    if branch.is_latent() {
        return Err(LoraXsError::AlreadyLatent {
            module: name.to_string(),
            adapter: adapter.to_string(),
        });
    }
    if branch.rank() != rank {
        return Err(LoraXsError::ShapeMismatch {
            context: format!("latent mapping for '{name}'"),
            expected: vec![rank, target.in_features()],
            actual: branch.lora_a().shape().to_vec(),
        });
    }

    let device = branch.lora_a().device();
    let latent =
        Tensor::new(normal(rank, rank, 0.0, f64::from(init_sigma), rng), true).on(device);
    target.install_latent(adapter, latent)?;

    tracing::debug!(module = name, adapter, rank, "installed latent mapping");
    Ok(())
}
