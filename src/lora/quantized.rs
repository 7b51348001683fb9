//! LoRA over an int8-quantized base weight
//!
//! The frozen base weight is stored as per-row symmetric int8 with one f32
//! scale per output channel: q = round(clamp(w / scale, -127, 127)),
//! w ≈ q * scale. Adapter factors stay in full precision.

use super::layer::{LoraBranch, LoraLinear};
use crate::error::Result;
use crate::nn::Linear;
use crate::tensor::{matmul_nt, Tensor};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use std::collections::BTreeMap;

const QMAX: f32 = 127.0;

/// LoRA layer whose base weight is int8
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedLoraLinear {
    /// Quantized base weight `[out, in]`
    weight_q: Array2<i8>,
    /// Per-output-channel scales `[out]`
    scales: Array1<f32>,
    bias: Option<Tensor>,
    adapters: BTreeMap<String, LoraBranch>,
}

impl QuantizedLoraLinear {
    /// Quantize the base layer of an existing LoRA layer
    pub fn from_lora(layer: LoraLinear) -> Self {
        let (base, adapters) = layer.into_parts();
        let (weight_q, scales) = quantize_rows(base.weight().data().view());
        Self { weight_q, scales, bias: base.bias().cloned(), adapters }
    }

    /// Quantize a plain linear layer with no adapters yet
    pub fn from_linear(base: Linear) -> Self {
        Self::from_lora(LoraLinear::new(base))
    }

    pub fn in_features(&self) -> usize {
        self.weight_q.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight_q.nrows()
    }

    pub fn adapter(&self, name: &str) -> Option<&LoraBranch> {
        self.adapters.get(name)
    }

    /// Reconstructed f32 base weight
    pub fn dequantize(&self) -> Array2<f32> {
        let mut w = self.weight_q.mapv(f32::from);
        for (mut row, &scale) in w.axis_iter_mut(Axis(0)).zip(self.scales.iter()) {
            row *= scale;
        }
        w
    }

    /// Forward pass with on-the-fly dequantization
    pub fn forward(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let weight = self.dequantize();
        let mut y = matmul_nt(x, weight.view())?;
        if let Some(b) = &self.bias {
            y += b.data();
        }
        for branch in self.adapters.values() {
            y += &branch.forward(x)?;
        }
        Ok(y)
    }

    /// Bytes held by the quantized base weight and its scales
    pub fn base_memory_bytes(&self) -> usize {
        self.weight_q.len() + self.scales.len() * std::mem::size_of::<f32>()
    }

    /// Float parameters; the int8 weight is a buffer and is not listed
    pub fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = Vec::new();
        if let Some(b) = &self.bias {
            params.push(("base_layer.bias".to_string(), b));
        }
        for (adapter, branch) in &self.adapters {
            for (prefix, p) in branch.parameters() {
                params.push((format!("{prefix}.{adapter}.weight"), p));
            }
        }
        params
    }

    pub fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let mut params = Vec::new();
        if let Some(b) = &mut self.bias {
            params.push(("base_layer.bias".to_string(), b));
        }
        for (adapter, branch) in &mut self.adapters {
            for (prefix, p) in branch.parameters_mut() {
                params.push((format!("{prefix}.{adapter}.weight"), p));
            }
        }
        params
    }
}

fn quantize_rows(w: ArrayView2<'_, f32>) -> (Array2<i8>, Array1<f32>) {
    let scales: Array1<f32> = w
        .axis_iter(Axis(0))
        .map(|row| row.iter().fold(0.0f32, |m, v| m.max(v.abs())).max(1e-8) / QMAX)
        .collect();
    let q = Array2::from_shape_fn(w.dim(), |(i, j)| {
        (w[[i, j]] / scales[i]).round().clamp(-QMAX, QMAX) as i8
    });
    (q, scales)
}
