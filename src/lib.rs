//! # lora-xs
//!
//! LoRA-XS initialization for LoRA-adapted models: each target layer's
//! frozen weight is factorized by truncated SVD, the factors become fixed
//! LoRA A/B projections, and a small `r × r` latent matrix between them is
//! the only parameter left to train.
//!
//! ## Architecture
//!
//! - **tensor**: `f32` parameter tensors with gradient flag and device tag
//! - **init**: seeded Gaussian and Kaiming-uniform initializers
//! - **nn**: owned module tree with named traversal
//! - **lora**: LoRA layers, int8 variant and adapter injection
//! - **reconstruct**: randomized truncated SVD and the reconstruction config
//! - **xs**: target lookup, factor grafting, latent installation
//! - **cli**: `lora-xs` command-line quickstart
//!
//! ## Example
//!
//! ```
//! use lora_xs::{find_and_initialize, inject_adapter, AdapterConfig, ReconstructConfig};
//! use lora_xs::{nn::zoo::toy_encoder, ReconstructionMethod};
//! use std::collections::BTreeMap;
//!
//! let mut model = toy_encoder(2, 32, 0);
//! let adapter = AdapterConfig::new(4, 4.0, ["query", "value"]);
//! inject_adapter(&mut model, "default", &adapter, &mut lora_xs::init::rng_from_seed(Some(1)))?;
//!
//! let configs = BTreeMap::from([("default".to_string(), adapter)]);
//! let config = ReconstructConfig::default().with_rank(4);
//! let report =
//!     find_and_initialize(&mut model, &configs, "default", ReconstructionMethod::Svd, &config)?;
//! assert_eq!(report.trainable_params, 4 * 4 * 4);
//! # Ok::<(), lora_xs::LoraXsError>(())
//! ```

pub mod cli;
pub mod error;
pub mod init;
pub mod lora;
pub mod nn;
pub mod reconstruct;
pub mod tensor;
pub mod xs;

pub use error::{LoraXsError, Result};
pub use lora::{inject_adapter, AdapterConfig, LoraLinear, TargetModules};
pub use nn::{Model, Module};
pub use reconstruct::{ReconstructConfig, Reconstruction, ReconstructionMethod, Reconstructor};
pub use tensor::{Device, Tensor};
pub use xs::{find_and_initialize, AdaptationReport};
