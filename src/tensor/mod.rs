//! Dense parameter tensors
//!
//! A [`Tensor`] is a row-major `f32` matrix with a gradient flag and a device
//! tag. Weights are `[out_features, in_features]`; biases are `[1, out]` rows
//! so they broadcast over a batch.

mod device;
mod ops;

pub use device::Device;
pub use ops::{frobenius_norm, matmul, matmul_nt, transpose};

use ndarray::{Array1, Array2, Axis};

/// Parameter tensor: a 2-D value plus training metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Array2<f32>,
    requires_grad: bool,
    device: Device,
}

impl Tensor {
    /// Create a tensor on the CPU
    pub fn new(data: Array2<f32>, requires_grad: bool) -> Self {
        Self { data, requires_grad, device: Device::Cpu }
    }

    /// Create a `[1, n]` row tensor from a vector
    pub fn row(data: Array1<f32>, requires_grad: bool) -> Self {
        Self::new(data.insert_axis(Axis(0)), requires_grad)
    }

    /// Create a zero-filled tensor
    pub fn zeros(rows: usize, cols: usize, requires_grad: bool) -> Self {
        Self::new(Array2::zeros((rows, cols)), requires_grad)
    }

    /// Underlying matrix
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// Mutable access to the underlying matrix
    pub fn data_mut(&mut self) -> &mut Array2<f32> {
        &mut self.data
    }

    /// `[rows, cols]`
    pub fn shape(&self) -> [usize; 2] {
        let (rows, cols) = self.data.dim();
        [rows, cols]
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the tensor has no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the optimizer updates this tensor
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Enable or disable gradient tracking
    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
    }

    /// Device the tensor lives on
    pub fn device(&self) -> Device {
        self.device
    }

    /// Move the tensor to `device`
    pub fn to_device(&mut self, device: Device) {
        self.device = device;
    }

    /// Builder-style device placement
    #[must_use]
    pub fn on(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}
