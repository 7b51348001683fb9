//! LoRA-wrapped linear layer
//!
//! For a frozen weight matrix W ∈ ℝ^(d_out × d_in), each adapter adds
//! ΔW = B @ A where A ∈ ℝ^(r × d_in) and B ∈ ℝ^(d_out × r), or
//! ΔW = B @ M @ A once a latent matrix M ∈ ℝ^(r × r) is installed.
//!
//! Forward pass: y = W@x + b + Σ_adapters scaling·ΔW@x

use super::branch::{LoraBranch, LowRankBranch};
use crate::error::{LoraXsError, Result};
use crate::init::kaiming_uniform;
use crate::nn::Linear;
use crate::tensor::Tensor;
use ndarray::{Array2, ArrayView2};
use rand::Rng;
use std::collections::BTreeMap;

/// Frozen base layer plus named adapter branches
#[derive(Debug, Clone, PartialEq)]
pub struct LoraLinear {
    base_layer: Linear,
    adapters: BTreeMap<String, LoraBranch>,
}

impl LoraLinear {
    /// Wrap `base_layer` and freeze it
    pub fn new(mut base_layer: Linear) -> Self {
        base_layer.freeze();
        Self { base_layer, adapters: BTreeMap::new() }
    }

    /// Attach (or re-initialize) adapter `name`
    ///
    /// A is drawn from Kaiming-uniform (`a = √5`), B is zero, so the layer
    /// output is unchanged until B is trained. Both land on the base
    /// weight's device.
    pub fn add_adapter<R: Rng>(
        &mut self,
        name: impl Into<String>,
        r: usize,
        lora_alpha: f32,
        rng: &mut R,
    ) -> Result<()> {
        let (d_in, d_out) = (self.in_features(), self.out_features());
        if r == 0 {
            return Err(LoraXsError::InvalidRank { rank: r, rows: d_out, cols: d_in });
        }
        let device = self.base_layer.weight().device();
        let lora_a = Tensor::new(kaiming_uniform(r, d_in, d_in, rng), true).on(device);
        let lora_b = Tensor::zeros(d_out, r, true).on(device);
        let branch = LowRankBranch::new(lora_a, lora_b, lora_alpha / r as f32)?;
        self.adapters.insert(name.into(), LoraBranch::LowRank(branch));
        Ok(())
    }

    pub fn base_layer(&self) -> &Linear {
        &self.base_layer
    }

    /// Base weight `[out, in]`
    pub fn weight(&self) -> &Tensor {
        self.base_layer.weight()
    }

    pub fn in_features(&self) -> usize {
        self.base_layer.in_features()
    }

    pub fn out_features(&self) -> usize {
        self.base_layer.out_features()
    }

    pub fn adapter(&self, name: &str) -> Option<&LoraBranch> {
        self.adapters.get(name)
    }

    pub fn adapter_mut(&mut self, name: &str) -> Option<&mut LoraBranch> {
        self.adapters.get_mut(name)
    }

    pub fn has_adapter(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    /// Attached adapter names, sorted
    pub fn adapter_names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    /// Convert adapter `name` to its latent form around `latent`
    ///
    /// An adapter that is already latent is rejected with `AlreadyLatent`.
    /// Errors leave the adapter untouched.
    pub fn install_latent(&mut self, name: &str, latent: Tensor) -> Result<()> {
        let branch = self.adapters.get(name).ok_or_else(|| self.unknown_adapter(name))?;
        let r = branch.rank();
        if latent.shape() != [r, r] {
            return Err(LoraXsError::ShapeMismatch {
                context: format!("latent mapping of adapter '{name}'"),
                expected: vec![r, r],
                actual: latent.shape().to_vec(),
            });
        }
        match self.adapters.remove(name) {
            Some(LoraBranch::LowRank(low_rank)) => {
                self.adapters
                    .insert(name.to_string(), LoraBranch::Latent(low_rank.into_latent(latent)));
                Ok(())
            }
            Some(branch) => {
                self.adapters.insert(name.to_string(), branch);
                Err(LoraXsError::AlreadyLatent { module: self.label(), adapter: name.to_string() })
            }
            None => Err(self.unknown_adapter(name)),
        }
    }

    /// Forward pass over a batch `[batch, in]`
    pub fn forward(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let mut y = self.base_layer.forward(x)?;
        for branch in self.adapters.values() {
            y += &branch.forward(x)?;
        }
        Ok(y)
    }

    /// Weight update contributed by adapter `name`
    pub fn delta_weight(&self, name: &str) -> Result<Array2<f32>> {
        self.adapters.get(name).ok_or_else(|| self.unknown_adapter(name))?.delta_weight()
    }

    /// `W + Σ ΔW` without modifying the layer
    pub fn merged_weight(&self) -> Result<Array2<f32>> {
        let mut w = self.base_layer.weight().data().clone();
        for branch in self.adapters.values() {
            w += &branch.delta_weight()?;
        }
        Ok(w)
    }

    /// Parameters named `base_layer.*` and `lora_{A,B,latent}.<adapter>.weight`
    pub fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params: Vec<(String, &Tensor)> = self
            .base_layer
            .named_parameters()
            .into_iter()
            .map(|(n, p)| (format!("base_layer.{n}"), p))
            .collect();
        for (adapter, branch) in &self.adapters {
            for (prefix, p) in branch.parameters() {
                params.push((format!("{prefix}.{adapter}.weight"), p));
            }
        }
        params
    }

    pub fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let mut params: Vec<(String, &mut Tensor)> = self
            .base_layer
            .named_parameters_mut()
            .into_iter()
            .map(|(n, p)| (format!("base_layer.{n}"), p))
            .collect();
        for (adapter, branch) in &mut self.adapters {
            for (prefix, p) in branch.parameters_mut() {
                params.push((format!("{prefix}.{adapter}.weight"), p));
            }
        }
        params
    }

    pub(crate) fn into_parts(self) -> (Linear, BTreeMap<String, LoraBranch>) {
        (self.base_layer, self.adapters)
    }

    fn label(&self) -> String {
        format!("Linear(in_features={}, out_features={})", self.in_features(), self.out_features())
    }

    fn unknown_adapter(&self, name: &str) -> LoraXsError {
        LoraXsError::UnknownAdapter {
            adapter: name.to_string(),
            known: self.adapters.keys().cloned().collect(),
        }
    }
}
