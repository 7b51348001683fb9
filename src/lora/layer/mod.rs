//! LoRA (Low-Rank Adaptation) layer implementation
//!
//! A [`LoraLinear`] keeps the pretrained linear layer frozen and adds one
//! [`LoraBranch`] per named adapter. A branch starts as a trainable low-rank
//! pair and can be converted into a latent branch whose outer factors are
//! frozen.

mod branch;
mod core;


pub use self::branch::{LatentBranch, LoraBranch, LowRankBranch};
pub use self::core::LoraLinear;
