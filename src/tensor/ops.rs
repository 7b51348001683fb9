//! Matrix operations over row-major `f32` matrices
//!
//! Shapes are checked up front and reported as
//! [`LoraXsError::ShapeMismatch`] instead of panicking inside ndarray.

use crate::error::{LoraXsError, Result};
use ndarray::{Array2, ArrayView2};

/// Matrix multiplication `C = A @ B`
///
/// # Arguments
/// * `a` - Left matrix `[m, k]`
/// * `b` - Right matrix `[k, n]`
///
/// # Returns
/// `[m, n]` product
pub fn matmul(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
    if a.ncols() != b.nrows() {
        return Err(LoraXsError::ShapeMismatch {
            context: "matmul".to_string(),
            expected: vec![a.ncols(), b.ncols()],
            actual: vec![b.nrows(), b.ncols()],
        });
    }
    Ok(a.dot(&b))
}

/// Linear-layer product `Y = X @ Wᵀ`
///
/// `x` is `[batch, in]`, `w` is stored `[out, in]`; the result is
/// `[batch, out]`.
pub fn matmul_nt(x: ArrayView2<'_, f32>, w: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
    if x.ncols() != w.ncols() {
        return Err(LoraXsError::ShapeMismatch {
            context: "linear input".to_string(),
            expected: vec![x.nrows(), w.ncols()],
            actual: vec![x.nrows(), x.ncols()],
        });
    }
    Ok(x.dot(&w.t()))
}

/// Transpose into a fresh row-major matrix
pub fn transpose(a: ArrayView2<'_, f32>) -> Array2<f32> {
    a.t().as_standard_layout().into_owned()
}

/// Frobenius norm `‖A‖_F`, accumulated in f64
pub fn frobenius_norm(a: ArrayView2<'_, f32>) -> f32 {
    a.iter().map(|&v| f64::from(v) * f64::from(v)).sum::<f64>().sqrt() as f32
}
