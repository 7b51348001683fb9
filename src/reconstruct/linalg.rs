//! Dense f64 kernels behind the randomized SVD
//!
//! Column orthonormalization for the range finder, an exact SVD of the small
//! projected matrix, and orthonormal completion of singular vectors lost to
//! an exactly rank-deficient weight.

use crate::error::{LoraXsError, Result};
use crate::init::normal_f64;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;

/// Columns whose norm collapses below this fraction of their original norm
/// are treated as linearly dependent and zeroed.
const DEPENDENT_COLUMN_RATIO: f64 = 1e-10;

/// Jacobi sweeps before giving up
const MAX_SWEEPS: usize = 80;

/// Off-diagonal cosine threshold for convergence
const JACOBI_TOL: f64 = 1e-13;

/// Orthonormalize the columns of `x` (modified Gram-Schmidt, two passes)
///
/// Dependent columns become zero vectors rather than noise, so the span
/// never grows beyond the true rank of `x`.
pub fn orthonormalize_columns(mut x: Array2<f64>) -> Array2<f64> {
    let cols = x.ncols();
    for j in 0..cols {
        let initial = x.column(j).dot(&x.column(j)).sqrt();
        for _ in 0..2 {
            for k in 0..j {
                let qk = x.column(k).to_owned();
                let proj = qk.dot(&x.column(j));
                x.column_mut(j).scaled_add(-proj, &qk);
            }
        }
        let norm = x.column(j).dot(&x.column(j)).sqrt();
        if norm > 0.0 && norm > initial * DEPENDENT_COLUMN_RATIO {
            x.column_mut(j).mapv_inplace(|v| v / norm);
        } else {
            x.column_mut(j).fill(0.0);
        }
    }
    x
}

/// Draws per column before a completion is abandoned
const COMPLETION_ATTEMPTS: usize = 8;

/// Fill the `missing` columns of `q` with unit vectors orthogonal to every
/// other column
///
/// The remaining columns must already be orthonormal. Fresh directions are
/// Gaussian draws from `rng` with the existing span projected out.
pub fn complete_orthonormal<R: Rng>(
    mut q: Array2<f64>,
    missing: &[usize],
    rng: &mut R,
) -> Array2<f64> {
    let rows = q.nrows();
    let mut basis: Vec<usize> = (0..q.ncols()).filter(|j| !missing.contains(j)).collect();
    for &j in missing {
        for _ in 0..COMPLETION_ATTEMPTS {
            let mut x = normal_f64(rows, 1, rng).column(0).to_owned();
            for _ in 0..2 {
                for &k in &basis {
                    let qk = q.column(k);
                    let proj = qk.dot(&x);
                    x.scaled_add(-proj, &qk);
                }
            }
            let norm = x.dot(&x).sqrt();
            if norm > 1e-6 {
                q.column_mut(j).assign(&(x / norm));
                basis.push(j);
                break;
            }
        }
    }
    q
}

/// Thin SVD `B = U · diag(s) · Vᵀ` of a small matrix
#[derive(Debug, Clone)]
pub struct ThinSvd {
    /// Left singular vectors `[rows, k]`
    pub u: Array2<f64>,
    /// Singular values, descending `[k]`
    pub s: Array1<f64>,
    /// Right singular vectors `[cols, k]`
    pub v: Array2<f64>,
}

/// One-sided Jacobi SVD of `b` (`[l, n]`, `l <= n` expected but not required)
///
/// Rotates the columns of `G = Bᵀ` until they are mutually orthogonal:
/// `G·J = W`, so `B = J · Σ · Ŵᵀ` with `Σ = diag(‖W_i‖)` and `Ŵ` the
/// normalized columns. Output is sorted by descending singular value.
pub fn jacobi_svd(b: ArrayView2<'_, f64>) -> Result<ThinSvd> {
    let mut g = b.t().to_owned();
    let k = g.ncols();
    let mut j_acc = Array2::<f64>::eye(k);
    // Columns at rounding-noise level carry no direction worth rotating
    let negligible = g.iter().map(|v| v * v).sum::<f64>() * f64::EPSILON * f64::EPSILON;

    let mut converged = k < 2;
    for _ in 0..MAX_SWEEPS {
        if converged {
            break;
        }
        let mut max_cos = 0.0f64;
        for p in 0..k.saturating_sub(1) {
            for q in (p + 1)..k {
                let alpha = g.column(p).dot(&g.column(p));
                let beta = g.column(q).dot(&g.column(q));
                let gamma = g.column(p).dot(&g.column(q));
                if alpha <= negligible || beta <= negligible || gamma == 0.0 {
                    continue;
                }
                let cos = gamma.abs() / (alpha * beta).sqrt();
                max_cos = max_cos.max(cos);
                if cos <= JACOBI_TOL {
                    continue;
                }
                let zeta = (beta - alpha) / (2.0 * gamma);
                let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;
                rotate_columns(&mut g, p, q, c, s);
                rotate_columns(&mut j_acc, p, q, c, s);
            }
        }
        converged = max_cos <= JACOBI_TOL;
    }
    if !converged {
        return Err(LoraXsError::Computation {
            message: format!("Jacobi SVD did not converge after {MAX_SWEEPS} sweeps"),
        });
    }

    let norms: Vec<f64> = g.axis_iter(Axis(1)).map(|col| col.dot(&col).sqrt()).collect();
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| norms[b].total_cmp(&norms[a]));

    let mut u = Array2::<f64>::zeros((j_acc.nrows(), k));
    let mut v = Array2::<f64>::zeros((g.nrows(), k));
    let mut s = Array1::<f64>::zeros(k);
    for (dst, &src) in order.iter().enumerate() {
        let sigma = norms[src];
        s[dst] = sigma;
        u.column_mut(dst).assign(&j_acc.column(src));
        if sigma > 0.0 {
            v.column_mut(dst).assign(&g.column(src).mapv(|x| x / sigma));
        }
    }
    Ok(ThinSvd { u, s, v })
}

fn rotate_columns(m: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    for mut row in m.rows_mut() {
        let xp = row[p];
        let xq = row[q];
        row[p] = c * xp - s * xq;
        row[q] = s * xp + c * xq;
    }
}
