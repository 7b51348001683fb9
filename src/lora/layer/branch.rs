//! Per-adapter branches of a LoRA layer
//!
//! A branch adds `scaling · ΔW · x` to the base output. The standard branch
//! uses `ΔW = B·A`; the latent branch routes through a square matrix,
//! `ΔW = B·M·A`, with `A` and `B` frozen.

use crate::error::{LoraXsError, Result};
use crate::tensor::{matmul, matmul_nt, Device, Tensor};
use ndarray::{Array2, ArrayView2};

/// `ΔW = B·A` with A `[r, in]` and B `[out, r]`
#[derive(Debug, Clone, PartialEq)]
pub struct LowRankBranch {
    pub(crate) lora_a: Tensor,
    pub(crate) lora_b: Tensor,
    pub(crate) scaling: f32,
}

impl LowRankBranch {
    /// Build a branch from factors, checking that their shapes chain
    pub fn new(lora_a: Tensor, lora_b: Tensor, scaling: f32) -> Result<Self> {
        check_chain(&lora_a, &lora_b)?;
        Ok(Self { lora_a, lora_b, scaling })
    }

    pub fn rank(&self) -> usize {
        self.lora_a.shape()[0]
    }

    pub fn lora_a(&self) -> &Tensor {
        &self.lora_a
    }

    pub fn lora_b(&self) -> &Tensor {
        &self.lora_b
    }

    pub fn scaling(&self) -> f32 {
        self.scaling
    }

    /// Swap in new A/B parameters
    ///
    /// The rank may change; the outer dimensions must match the old factors.
    pub fn replace_factors(&mut self, lora_a: Tensor, lora_b: Tensor) -> Result<()> {
        check_chain(&lora_a, &lora_b)?;
        let expected_in = self.lora_a.shape()[1];
        if lora_a.shape()[1] != expected_in {
            return Err(LoraXsError::ShapeMismatch {
                context: "lora_A input width".to_string(),
                expected: vec![lora_a.shape()[0], expected_in],
                actual: lora_a.shape().to_vec(),
            });
        }
        let expected_out = self.lora_b.shape()[0];
        if lora_b.shape()[0] != expected_out {
            return Err(LoraXsError::ShapeMismatch {
                context: "lora_B output width".to_string(),
                expected: vec![expected_out, lora_b.shape()[1]],
                actual: lora_b.shape().to_vec(),
            });
        }
        self.lora_a = lora_a;
        self.lora_b = lora_b;
        Ok(())
    }

    /// `scaling · (x·Aᵀ)·Bᵀ`
    pub fn forward(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let hidden = matmul_nt(x, self.lora_a.data().view())?;
        let out = matmul_nt(hidden.view(), self.lora_b.data().view())?;
        Ok(out * self.scaling)
    }

    /// `scaling · B·A`
    pub fn delta_weight(&self) -> Result<Array2<f32>> {
        Ok(matmul(self.lora_b.data().view(), self.lora_a.data().view())? * self.scaling)
    }

    /// Route through `latent` and freeze A/B
    ///
    /// The caller guarantees `latent` is `[r, r]`.
    pub(super) fn into_latent(mut self, mut latent: Tensor) -> LatentBranch {
        self.lora_a.set_requires_grad(false);
        self.lora_b.set_requires_grad(false);
        latent.set_requires_grad(true);
        LatentBranch { lora_a: self.lora_a, latent, lora_b: self.lora_b, scaling: self.scaling }
    }
}

/// `ΔW = B·M·A` with the square latent matrix `M` `[r, r]`
#[derive(Debug, Clone, PartialEq)]
pub struct LatentBranch {
    lora_a: Tensor,
    latent: Tensor,
    lora_b: Tensor,
    scaling: f32,
}

impl LatentBranch {
    pub fn rank(&self) -> usize {
        self.latent.shape()[0]
    }

    pub fn lora_a(&self) -> &Tensor {
        &self.lora_a
    }

    pub fn lora_b(&self) -> &Tensor {
        &self.lora_b
    }

    pub fn latent(&self) -> &Tensor {
        &self.latent
    }

    pub fn latent_mut(&mut self) -> &mut Tensor {
        &mut self.latent
    }

    pub fn scaling(&self) -> f32 {
        self.scaling
    }

    /// `scaling · ((x·Aᵀ)·Mᵀ)·Bᵀ`
    pub fn forward(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let encoded = matmul_nt(x, self.lora_a.data().view())?;
        let mapped = matmul_nt(encoded.view(), self.latent.data().view())?;
        let out = matmul_nt(mapped.view(), self.lora_b.data().view())?;
        Ok(out * self.scaling)
    }

    /// `scaling · B·M·A`
    pub fn delta_weight(&self) -> Result<Array2<f32>> {
        let bm = matmul(self.lora_b.data().view(), self.latent.data().view())?;
        Ok(matmul(bm.view(), self.lora_a.data().view())? * self.scaling)
    }
}

/// One adapter's contribution to a LoRA layer
#[derive(Debug, Clone, PartialEq)]
pub enum LoraBranch {
    LowRank(LowRankBranch),
    Latent(LatentBranch),
}

impl LoraBranch {
    pub fn is_latent(&self) -> bool {
        matches!(self, Self::Latent(_))
    }

    pub fn rank(&self) -> usize {
        match self {
            Self::LowRank(b) => b.rank(),
            Self::Latent(b) => b.rank(),
        }
    }

    pub fn lora_a(&self) -> &Tensor {
        match self {
            Self::LowRank(b) => &b.lora_a,
            Self::Latent(b) => &b.lora_a,
        }
    }

    pub fn lora_b(&self) -> &Tensor {
        match self {
            Self::LowRank(b) => &b.lora_b,
            Self::Latent(b) => &b.lora_b,
        }
    }

    pub fn latent(&self) -> Option<&Tensor> {
        match self {
            Self::LowRank(_) => None,
            Self::Latent(b) => Some(&b.latent),
        }
    }

    pub fn scaling(&self) -> f32 {
        match self {
            Self::LowRank(b) => b.scaling,
            Self::Latent(b) => b.scaling,
        }
    }

    pub fn forward(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        match self {
            Self::LowRank(b) => b.forward(x),
            Self::Latent(b) => b.forward(x),
        }
    }

    pub fn delta_weight(&self) -> Result<Array2<f32>> {
        match self {
            Self::LowRank(b) => b.delta_weight(),
            Self::Latent(b) => b.delta_weight(),
        }
    }

    /// Move every `lora_*` tensor to `device`
    pub fn to_device(&mut self, device: Device) {
        for (_, p) in self.parameters_mut() {
            p.to_device(device);
        }
    }

    /// `(prefix, tensor)` pairs: `lora_A`, `lora_B`, then `lora_latent` when present
    pub fn parameters(&self) -> Vec<(&'static str, &Tensor)> {
        match self {
            Self::LowRank(b) => vec![("lora_A", &b.lora_a), ("lora_B", &b.lora_b)],
            Self::Latent(b) => {
                vec![("lora_A", &b.lora_a), ("lora_B", &b.lora_b), ("lora_latent", &b.latent)]
            }
        }
    }

    pub fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        match self {
            Self::LowRank(b) => vec![("lora_A", &mut b.lora_a), ("lora_B", &mut b.lora_b)],
            Self::Latent(b) => vec![
                ("lora_A", &mut b.lora_a),
                ("lora_B", &mut b.lora_b),
                ("lora_latent", &mut b.latent),
            ],
        }
    }
}

fn check_chain(lora_a: &Tensor, lora_b: &Tensor) -> Result<()> {
    let rank = lora_a.shape()[0];
    if lora_b.shape()[1] != rank {
        return Err(LoraXsError::ShapeMismatch {
            context: "lora_B rank".to_string(),
            expected: vec![lora_b.shape()[0], rank],
            actual: lora_b.shape().to_vec(),
        });
    }
    Ok(())
}
