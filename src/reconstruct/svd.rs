//! Truncated SVD reconstruction of a weight matrix
//!
//! Randomized range finder (Halko, Martinsson & Tropp) with power iterations,
//! followed by an exact Jacobi SVD of the projected matrix:
//!
//! 1. `Y = W·Ω` for a seeded Gaussian `Ω ∈ ℝ^(n × l)`, `l = min(r + 10, min(m, n))`
//! 2. `n_iter` rounds of `Q ← orth(W·orth(Wᵀ·Q))`
//! 3. `B = Qᵀ·W`, `B = Ũ·Σ·Vᵀ`, `U = Q·Ũ`
//! 4. singular vectors lost to an exactly rank-deficient `W` are completed
//!    to an orthonormal set, with `σ = 0`
//!
//! The factors are returned in the weight's storage orientation: for
//! `W ∈ ℝ^(out × in)` the encoder is `[r, in]` (stored as LoRA A) and the
//! decoder is `[out, r]` (stored as LoRA B), so `decoder · encoder ≈ W`.

use super::linalg::{complete_orthonormal, jacobi_svd, orthonormalize_columns};
use crate::error::{LoraXsError, Result};
use crate::init::normal_f64;
use crate::tensor::frobenius_norm;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Extra sketch columns beyond the requested rank
pub const OVERSAMPLES: usize = 10;

/// How the singular values are split between the two factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigmaPlacement {
    /// `encoder = Σ^½·Vᵀ`, `decoder = U·Σ^½`
    Balanced,
    /// `encoder = Σ·Vᵀ`, `decoder = U` with orthonormal columns
    #[default]
    Encoder,
}

/// Rank-`r` singular triplets in f64
#[derive(Debug, Clone)]
pub struct TruncatedSvd {
    /// Left singular vectors `[m, r]`
    pub u: Array2<f64>,
    /// Singular values, descending `[r]`
    pub s: Array1<f64>,
    /// Right singular vectors `[n, r]`
    pub v: Array2<f64>,
}

/// Output of a reconstruction
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// Best rank-`r` approximation `[m, n]`
    pub reconstructed: Array2<f32>,
    /// Encoder factor `[r, n]`
    pub encoder: Array2<f32>,
    /// Decoder factor `[m, r]`
    pub decoder: Array2<f32>,
    /// Kept singular values, descending `[r]`
    pub singular_values: Array1<f32>,
}

impl Reconstruction {
    /// Rank of the factorization
    pub fn rank(&self) -> usize {
        self.singular_values.len()
    }

    /// `‖W − decoder·encoder‖_F`
    pub fn residual_norm(&self, weight: ArrayView2<'_, f32>) -> f32 {
        frobenius_norm((&weight - &self.reconstructed).view())
    }
}

fn check_rank(rank: usize, rows: usize, cols: usize) -> Result<()> {
    if rank == 0 || rank > rows.min(cols) {
        return Err(LoraXsError::InvalidRank { rank, rows, cols });
    }
    Ok(())
}

fn is_unit(col: ArrayView1<'_, f64>) -> bool {
    (col.dot(&col) - 1.0).abs() < 1e-6
}

/// Randomized truncated SVD of `weight`
///
/// Deterministic for a fixed `(seed, n_iter)`.
pub fn truncated_svd(
    weight: ArrayView2<'_, f32>,
    rank: usize,
    n_iter: usize,
    seed: u64,
) -> Result<TruncatedSvd> {
    let (m, n) = weight.dim();
    check_rank(rank, m, n)?;
    if !weight.iter().all(|v| v.is_finite()) {
        return Err(LoraXsError::Computation {
            message: "weight contains NaN or infinite values".to_string(),
        });
    }

    let a = weight.mapv(f64::from);
    let sketch = (rank + OVERSAMPLES).min(m.min(n));

    let mut rng = StdRng::seed_from_u64(seed);
    let omega = normal_f64(n, sketch, &mut rng);
    let mut q = orthonormalize_columns(a.dot(&omega));
    for _ in 0..n_iter {
        let z = orthonormalize_columns(a.t().dot(&q));
        q = orthonormalize_columns(a.dot(&z));
    }

    let b = q.t().dot(&a);
    let small = jacobi_svd(b.view())?;
    let u = q.dot(&small.u);

    let mut u = u.slice(s![.., ..rank]).to_owned();
    let mut v = small.v.slice(s![.., ..rank]).to_owned();
    let missing: Vec<usize> =
        (0..rank).filter(|&j| !is_unit(u.column(j)) || !is_unit(v.column(j))).collect();
    let mut sigma = small.s.slice(s![..rank]).to_owned();
    if !missing.is_empty() {
        u = complete_orthonormal(u, &missing, &mut rng);
        v = complete_orthonormal(v, &missing, &mut rng);
        for &j in &missing {
            sigma[j] = 0.0;
        }
    }

    Ok(TruncatedSvd { u, s: sigma, v })
}

/// Reconstruct `weight` at `rank` with Σ folded into the encoder
///
/// # Arguments
/// * `weight` - Matrix `[m, n]`
/// * `rank` - Target rank, `1 ≤ rank ≤ min(m, n)`
/// * `n_iter` - Power iterations
/// * `seed` - Seed for the Gaussian sketch
pub fn reconstruct(
    weight: ArrayView2<'_, f32>,
    rank: usize,
    n_iter: usize,
    seed: u64,
) -> Result<Reconstruction> {
    reconstruct_with(weight, rank, n_iter, seed, SigmaPlacement::default())
}

/// Reconstruct `weight` at `rank` with an explicit Σ placement
pub fn reconstruct_with(
    weight: ArrayView2<'_, f32>,
    rank: usize,
    n_iter: usize,
    seed: u64,
    placement: SigmaPlacement,
) -> Result<Reconstruction> {
    let svd = truncated_svd(weight, rank, n_iter, seed)?;

    if svd.s.iter().any(|&sigma| sigma <= f64::EPSILON * svd.s[0].max(1.0)) {
        tracing::warn!(
            rank,
            shape = ?weight.dim(),
            "weight has numerical rank below the requested rank; trailing components carry no signal"
        );
    }

    let (enc_scale, dec_scale) = match placement {
        SigmaPlacement::Balanced => {
            let root = svd.s.mapv(f64::sqrt);
            (root.clone(), root)
        }
        SigmaPlacement::Encoder => (svd.s.clone(), Array1::ones(svd.s.len())),
    };

    let encoder = (&svd.v * &enc_scale).t().mapv(|x| x as f32);
    let decoder = (&svd.u * &dec_scale).mapv(|x| x as f32);
    let reconstructed = (&svd.u * &svd.s).dot(&svd.v.t()).mapv(|x| x as f32);

    Ok(Reconstruction {
        reconstructed,
        encoder,
        decoder,
        singular_values: svd.s.mapv(|x| x as f32),
    })
}
