//! End-to-end LoRA-XS initialization pass

use super::grafter::{check_target, graft, GraftPolicy};
use super::latent::install_latent;
use super::locator::find_targets;
use crate::error::{LoraXsError, Result};
use crate::init::rng_from_seed;
use crate::lora::AdapterConfig;
use crate::nn::{Model, Module};
use crate::reconstruct::{ReconstructConfig, Reconstruction, ReconstructionMethod};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Whether this build can handle int8-loaded models
pub const INT8_SUPPORTED: bool = cfg!(feature = "int8");

/// One adapted module
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptedModule {
    pub name: String,
    pub rank: usize,
    pub out_features: usize,
    pub in_features: usize,
    /// `‖W − decoder·encoder‖_F` before any re-initialization
    pub residual: f32,
}

/// Summary of a completed pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptationReport {
    pub adapter: String,
    pub method: ReconstructionMethod,
    pub r_squared: bool,
    pub modules: Vec<AdaptedModule>,
    pub trainable_params: usize,
    pub total_params: usize,
}

impl fmt::Display for AdaptationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Adapter '{}' ({}, {}): {} module(s)",
            self.adapter,
            self.method,
            if self.r_squared { "r-squared" } else { "low-rank" },
            self.modules.len()
        )?;
        for m in &self.modules {
            writeln!(
                f,
                "  {:<56} [{:>4} x {:<4}] r={:<3} residual={:.4}",
                m.name, m.out_features, m.in_features, m.rank, m.residual
            )?;
        }
        let pct = if self.total_params == 0 {
            0.0
        } else {
            100.0 * self.trainable_params as f64 / self.total_params as f64
        };
        write!(
            f,
            "Trainable parameters: {} / {} ({pct:.4}%)",
            self.trainable_params, self.total_params
        )
    }
}

struct Plan {
    name: String,
    rank: usize,
    residual: f32,
    factors: Reconstruction,
}

/// Turn adapter `adapter_name` on every matching module into LoRA-XS
///
/// Validation, target lookup and every reconstruction happen before the
/// first module is modified, so an error leaves `model` untouched. On
/// success each matched module's adapter holds the reconstructed factors
/// and, in r-squared mode, a trainable latent matrix between frozen A and B.
pub fn find_and_initialize(
    model: &mut Model,
    adapter_configs: &BTreeMap<String, AdapterConfig>,
    adapter_name: &str,
    method: ReconstructionMethod,
    config: &ReconstructConfig,
) -> Result<AdaptationReport> {
    config.mode()?;
    let adapter_config =
        adapter_configs.get(adapter_name).ok_or_else(|| LoraXsError::UnknownAdapter {
            adapter: adapter_name.to_string(),
            known: adapter_configs.keys().cloned().collect(),
        })?;
    let targets = adapter_config.target_modules.as_list()?;
    if model.is_loaded_in_8bit() && !INT8_SUPPORTED {
        return Err(LoraXsError::MissingDependency {
            capability: "int8 quantization".to_string(),
            hint: "Rebuild with `--features int8` to adapt 8-bit models".to_string(),
        });
    }
    let reconstructor = config.reconstructor(method)?;

    tracing::info!(
        adapter = adapter_name,
        %method,
        targets = ?targets,
        r_squared = config.r_squared,
        "starting LoRA-XS initialization"
    );

    let mut plans = Vec::new();
    for (name, module) in find_targets(model, targets) {
        let layer = check_target(&name, module, adapter_name)?;
        let rank = config.rank_for(&name, adapter_config.r);
        let weight = layer.weight().data().view();
        let factors = reconstructor.reconstruct(weight, rank)?;
        let residual = factors.residual_norm(weight);
        tracing::debug!(module = %name, rank, residual, "reconstructed");
        plans.push(Plan { name, rank, residual, factors });
    }
    if plans.is_empty() {
        return Err(LoraXsError::NoMatchingModules { target_modules: targets.to_vec() });
    }

    let policy = GraftPolicy::from_config(config);
    let mut rng = rng_from_seed(config.init_seed);
    let mut modules = Vec::with_capacity(plans.len());
    for Plan { name, rank, residual, factors } in plans {
        let target = match model.get_submodule_mut(&name)? {
            Module::Lora(layer) => layer,
            other => {
                return Err(LoraXsError::UnsupportedTargetType {
                    module: name,
                    kind: other.kind().to_string(),
                })
            }
        };
        graft(&name, target, adapter_name, factors, &policy, &mut rng)?;
        if config.r_squared {
            install_latent(&name, target, adapter_name, rank, config.latent_init_sigma, &mut rng)?;
        }
        modules.push(AdaptedModule {
            rank,
            out_features: target.out_features(),
            in_features: target.in_features(),
            residual,
            name,
        });
    }

    let report = AdaptationReport {
        adapter: adapter_name.to_string(),
        method,
        r_squared: config.r_squared,
        modules,
        trainable_params: model.num_trainable_parameters(),
        total_params: model.num_parameters(),
    };
    tracing::info!(
        modules = report.modules.len(),
        trainable = report.trainable_params,
        total = report.total_params,
        "LoRA-XS initialization complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::{inject_adapter, QuantizedLoraLinear, TargetModules};
    use crate::nn::zoo::toy_encoder;
    use crate::nn::{Container, Linear};
    use crate::reconstruct::reconstruct_with;
    use ndarray::s;

    fn adapted_model(targets: &[&str]) -> (Model, BTreeMap<String, AdapterConfig>) {
        let mut model = toy_encoder(2, 16, 7);
        let config = AdapterConfig::new(4, 4.0, targets.iter().copied());
        inject_adapter(&mut model, "default", &config, &mut rng_from_seed(Some(8))).unwrap();
        (model, BTreeMap::from([("default".to_string(), config)]))
    }

    fn seeded() -> ReconstructConfig {
        ReconstructConfig::default().with_init_seed(0)
    }

    #[test]
    fn test_only_latent_matrices_trainable() {
        let (mut model, configs) = adapted_model(&["query", "value"]);
        let report = find_and_initialize(
            &mut model,
            &configs,
            "default",
            ReconstructionMethod::Svd,
            &seeded(),
        )
        .unwrap();
        assert_eq!(report.modules.len(), 4);
        assert_eq!(report.trainable_params, 4 * 16);
        for (name, p) in model.named_parameters() {
            assert_eq!(p.requires_grad(), name.contains(".lora_latent."), "{name}");
        }
    }

    #[test]
    fn test_unknown_adapter() {
        let (mut model, configs) = adapted_model(&["query"]);
        let err = find_and_initialize(
            &mut model,
            &configs,
            "other",
            ReconstructionMethod::Svd,
            &seeded(),
        )
        .unwrap_err();
        assert!(matches!(err, LoraXsError::UnknownAdapter { .. }));
    }

    #[test]
    fn test_unsupported_mode_checked_first() {
        let (mut model, configs) = adapted_model(&["query"]);
        let before = model.clone();
        let config = ReconstructConfig { reconstr_mode: "stacked".into(), ..seeded() };
        let err = find_and_initialize(
            &mut model,
            &configs,
            "default",
            ReconstructionMethod::Svd,
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, LoraXsError::UnsupportedMode { .. }));
        assert_eq!(model, before);
    }

    #[test]
    fn test_single_string_targets_rejected() {
        let (mut model, mut configs) = adapted_model(&["query"]);
        if let Some(config) = configs.get_mut("default") {
            config.target_modules = TargetModules::Single("query".into());
        }
        let err = find_and_initialize(
            &mut model,
            &configs,
            "default",
            ReconstructionMethod::Svd,
            &seeded(),
        )
        .unwrap_err();
        assert!(matches!(err, LoraXsError::InvalidTargetSpec { .. }));
    }

    #[test]
    fn test_quantized_target_rejected_before_mutation() {
        let mut rng = rng_from_seed(Some(0));
        let mut lora = crate::lora::LoraLinear::new(Linear::init(8, 8, false, &mut rng));
        lora.add_adapter("default", 2, 2.0, &mut rng).unwrap();
        let mut quant_lora = crate::lora::LoraLinear::new(Linear::init(8, 8, false, &mut rng));
        quant_lora.add_adapter("default", 2, 2.0, &mut rng).unwrap();
        let mut model = Model::new(
            Container::new()
                .with("a_proj", lora)
                .with("b_proj", QuantizedLoraLinear::from_lora(quant_lora)),
        );
        let before = model.clone();
        let configs =
            BTreeMap::from([("default".to_string(), AdapterConfig::new(2, 2.0, ["proj"]))]);
        let err = find_and_initialize(
            &mut model,
            &configs,
            "default",
            ReconstructionMethod::Svd,
            &seeded(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoraXsError::UnsupportedTargetType { ref module, .. } if module == "b_proj"
        ));
        assert_eq!(model, before);
    }

    #[test]
    fn test_8bit_model_needs_feature() {
        let (model, configs) = adapted_model(&["query"]);
        let mut model = model.with_8bit(true);
        let result = find_and_initialize(
            &mut model,
            &configs,
            "default",
            ReconstructionMethod::Svd,
            &seeded(),
        );
        if INT8_SUPPORTED {
            assert!(result.is_ok());
        } else {
            assert!(matches!(result, Err(LoraXsError::MissingDependency { .. })));
        }
    }

    #[test]
    fn test_invalid_override_rank_leaves_model_untouched() {
        let (mut model, configs) = adapted_model(&["query"]);
        let before = model.clone();
        let config =
            seeded().with_rank_override("roberta.encoder.layer.1.attention.self.query", 17);
        let err = find_and_initialize(
            &mut model,
            &configs,
            "default",
            ReconstructionMethod::Svd,
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, LoraXsError::InvalidRank { rank: 17, .. }));
        assert_eq!(model, before);
    }

    #[test]
    fn test_non_r_squared_keeps_low_rank_branches() {
        let (mut model, configs) = adapted_model(&["value"]);
        let config = ReconstructConfig { r_squared: false, ..seeded() };
        let report = find_and_initialize(
            &mut model,
            &configs,
            "default",
            ReconstructionMethod::Svd,
            &config,
        )
        .unwrap();
        assert!(!report.r_squared);
        for m in &report.modules {
            let layer = model.get_submodule(&m.name).unwrap().as_lora().unwrap();
            let branch = layer.adapter("default").unwrap();
            assert!(!branch.is_latent());
            assert!(branch.lora_a().requires_grad());
            assert!(branch.lora_b().requires_grad());
        }
    }

    fn svd_decoder(model: &Model, name: &str, config: &ReconstructConfig) -> ndarray::Array2<f32> {
        let layer = model.get_submodule(name).unwrap().as_lora().unwrap();
        let svd = config.svd_config(ReconstructionMethod::Svd).unwrap();
        let weight = layer.weight().data().view();
        reconstruct_with(weight, 4, svd.n_iter, svd.random_state, config.sigma_placement)
            .unwrap()
            .decoder
    }

    #[test]
    fn test_half_init_dec_redraws_trailing_decoder_columns() {
        let (mut model, configs) = adapted_model(&["query"]);
        let config = ReconstructConfig { half_init_dec: true, ..seeded() };
        let report = find_and_initialize(
            &mut model,
            &configs,
            "default",
            ReconstructionMethod::Svd,
            &config,
        )
        .unwrap();

        let bound = 1.0 / (16f32).sqrt() + 1e-6;
        for m in &report.modules {
            let expected = svd_decoder(&model, &m.name, &config);
            let layer = model.get_submodule(&m.name).unwrap().as_lora().unwrap();
            let b = layer.adapter("default").unwrap().lora_b().data();
            assert_eq!(b.slice(s![.., ..2]), expected.slice(s![.., ..2]));
            assert_ne!(b.slice(s![.., 2..]), expected.slice(s![.., 2..]));
            assert!(b.slice(s![.., 2..]).iter().all(|v| v.abs() <= bound));
        }
    }

    #[test]
    fn test_random_init_replaces_svd_factors() {
        let (mut model, configs) = adapted_model(&["value"]);
        let config = ReconstructConfig { replacement_module_random_init: true, ..seeded() };
        let report = find_and_initialize(
            &mut model,
            &configs,
            "default",
            ReconstructionMethod::Svd,
            &config,
        )
        .unwrap();

        for m in &report.modules {
            let expected = svd_decoder(&model, &m.name, &config);
            let layer = model.get_submodule(&m.name).unwrap().as_lora().unwrap();
            let branch = layer.adapter("default").unwrap();
            assert!(branch.is_latent());
            assert_ne!(branch.lora_b().data(), &expected);
            assert!(branch.lora_a().data().iter().all(|v| v.abs() <= 0.5 + 1e-6));
            assert!(branch.lora_b().data().iter().all(|v| v.abs() <= 0.25 + 1e-6));
        }
    }

    #[test]
    fn test_report_display() {
        let (mut model, configs) = adapted_model(&["query"]);
        let report = find_and_initialize(
            &mut model,
            &configs,
            "default",
            ReconstructionMethod::Svd,
            &seeded(),
        )
        .unwrap();
        let text = report.to_string();
        assert!(text.contains("roberta.encoder.layer.0.attention.self.query"));
        assert!(text.contains("Trainable parameters: 32 /"));
    }
}
