//! LoRA-XS: SVD-initialized adapters with a trainable latent matrix
//!
//! Starting from a model whose target linear layers already carry a LoRA
//! adapter, each target weight `W` is factorized as `W ≈ decoder·encoder`
//! by truncated SVD. The factors replace the adapter's B and A, both are
//! frozen, and a small `r × r` matrix `M` between them becomes the only
//! trainable parameter: `ΔW = scaling · B·M·A`.
//!
//! ```text
//! find_and_initialize
//!   ├─ find_targets      suffix match over named_modules()
//!   ├─ Reconstructor     truncated SVD → (encoder, decoder)
//!   ├─ graft             A ← encoder, B ← decoder, device placement
//!   └─ install_latent    M ~ N(0, σ²), A/B frozen
//! ```

mod grafter;
mod latent;
mod locator;
mod orchestrator;

pub use grafter::{check_target, graft, GraftPolicy};
pub use latent::install_latent;
pub use locator::find_targets;
pub use orchestrator::{find_and_initialize, AdaptationReport, AdaptedModule, INT8_SUPPORTED};
