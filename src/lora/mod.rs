//! LoRA (Low-Rank Adaptation) implementation
//!
//! LoRA enables parameter-efficient fine-tuning of large pretrained models
//! by adding trainable low-rank decomposition matrices to frozen weights.

mod config;
mod inject;
mod layer;
mod quantized;

pub use config::{AdapterConfig, TargetModules};
pub use inject::inject_adapter;
pub use layer::{LatentBranch, LoraBranch, LoraLinear, LowRankBranch};
pub use quantized::QuantizedLoraLinear;
