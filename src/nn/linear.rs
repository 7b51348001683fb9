//! Dense linear layer `y = x·Wᵀ + b`

use crate::error::{LoraXsError, Result};
use crate::init::{kaiming_uniform, kaiming_uniform_bound, KAIMING_A};
use crate::tensor::{matmul_nt, Tensor};
use ndarray::{Array1, Array2, ArrayView2};
use rand::Rng;

/// Fully connected layer with weight `[out_features, in_features]`
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    weight: Tensor,
    bias: Option<Tensor>,
}

impl Linear {
    /// Wrap existing parameters
    ///
    /// The bias, when present, must be a `[1, out_features]` row.
    pub fn new(weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        if let Some(b) = &bias {
            let [out, _] = weight.shape();
            if b.shape() != [1, out] {
                return Err(LoraXsError::ShapeMismatch {
                    context: "linear bias".to_string(),
                    expected: vec![1, out],
                    actual: b.shape().to_vec(),
                });
            }
        }
        Ok(Self { weight, bias })
    }

    /// Freshly initialized layer
    ///
    /// Weight and bias are drawn from `U(-1/√in, 1/√in)`.
    pub fn init<R: Rng>(in_features: usize, out_features: usize, bias: bool, rng: &mut R) -> Self {
        let weight = kaiming_uniform(out_features, in_features, in_features, rng);
        let bias = bias.then(|| {
            let bound = kaiming_uniform_bound(in_features, KAIMING_A);
            let values: Array1<f32> =
                (0..out_features).map(|_| rng.random_range(-bound..bound) as f32).collect();
            Tensor::row(values, true)
        });
        Self { weight: Tensor::new(weight, true), bias }
    }

    /// Input width
    pub fn in_features(&self) -> usize {
        self.weight.shape()[1]
    }

    /// Output width
    pub fn out_features(&self) -> usize {
        self.weight.shape()[0]
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn weight_mut(&mut self) -> &mut Tensor {
        &mut self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    /// Forward pass over a batch `[batch, in]` → `[batch, out]`
    pub fn forward(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let mut y = matmul_nt(x, self.weight.data().view())?;
        if let Some(b) = &self.bias {
            y += b.data();
        }
        Ok(y)
    }

    /// Stop gradient tracking on every parameter
    pub fn freeze(&mut self) {
        self.weight.set_requires_grad(false);
        if let Some(b) = &mut self.bias {
            b.set_requires_grad(false);
        }
    }

    /// `("weight", ..)` then `("bias", ..)` when present
    pub fn named_parameters(&self) -> Vec<(&'static str, &Tensor)> {
        let mut params = vec![("weight", &self.weight)];
        if let Some(b) = &self.bias {
            params.push(("bias", b));
        }
        params
    }

    pub fn named_parameters_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        let mut params = vec![("weight", &mut self.weight)];
        if let Some(b) = &mut self.bias {
            params.push(("bias", b));
        }
        params
    }
}
