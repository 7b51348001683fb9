//! Weight initialization schemes
//!
//! Gaussian draws use the Box-Muller transform over a seeded `StdRng`, so a
//! fixed seed reproduces the same parameters.

use ndarray::{Array2, ArrayViewMut2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Negative slope used by the standard LoRA factor initialization
pub const KAIMING_A: f64 = 2.236_067_977_499_79; // sqrt(5)

/// Build an RNG from an optional seed, falling back to OS entropy
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Draw one standard normal sample
pub fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    // Box-Muller transform
    let u1: f64 = rng.random::<f64>().max(1e-10);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Matrix of i.i.d. `N(mean, std²)` samples
pub fn normal<R: Rng>(rows: usize, cols: usize, mean: f64, std: f64, rng: &mut R) -> Array2<f32> {
    Array2::from_shape_simple_fn((rows, cols), || (mean + std * standard_normal(rng)) as f32)
}

/// Same as [`normal`] in f64, for the numerical routines
pub fn normal_f64<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Array2<f64> {
    Array2::from_shape_simple_fn((rows, cols), || standard_normal(rng))
}

/// Kaiming-uniform bound for leaky-ReLU slope `a`
///
/// `gain = sqrt(2 / (1 + a²))`, `bound = gain * sqrt(3 / fan_in)`. With
/// `a = √5` this is `1 / sqrt(fan_in)`.
pub fn kaiming_uniform_bound(fan_in: usize, a: f64) -> f64 {
    let gain = (2.0 / (1.0 + a * a)).sqrt();
    gain * (3.0 / fan_in.max(1) as f64).sqrt()
}

/// Fill `target` in place from `U(-bound, bound)` with the Kaiming bound for `fan_in`
pub fn kaiming_uniform_<R: Rng>(mut target: ArrayViewMut2<'_, f32>, fan_in: usize, rng: &mut R) {
    let bound = kaiming_uniform_bound(fan_in, KAIMING_A);
    target.mapv_inplace(|_| rng.random_range(-bound..bound) as f32);
}

/// Fresh `[rows, cols]` Kaiming-uniform matrix
pub fn kaiming_uniform<R: Rng>(rows: usize, cols: usize, fan_in: usize, rng: &mut R) -> Array2<f32> {
    let mut out = Array2::zeros((rows, cols));
    kaiming_uniform_(out.view_mut(), fan_in, rng);
    out
}
