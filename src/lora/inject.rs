//! Wrap target linear layers with LoRA adapters
//!
//! Matching follows PEFT: a module is targeted when its qualified name equals
//! a target or ends with `.<target>`.

use super::config::AdapterConfig;
use super::layer::LoraLinear;
use crate::error::{LoraXsError, Result};
use crate::nn::{Container, Model, Module};
use rand::Rng;

fn matches_target(name: &str, target: &str) -> bool {
    name == target
        || name.strip_suffix(target).is_some_and(|head| head.ends_with('.'))
}

/// Attach adapter `adapter_name` to every matching `Linear` or `LoraLinear`
///
/// Plain linear layers are wrapped into [`LoraLinear`]; existing LoRA layers
/// gain another adapter. Afterwards only `lora_*` parameters are trainable.
/// Returns the qualified names of the adapted modules, in traversal order.
pub fn inject_adapter<R: Rng>(
    model: &mut Model,
    adapter_name: &str,
    config: &AdapterConfig,
    rng: &mut R,
) -> Result<Vec<String>> {
    config.validate()?;
    let targets = config.target_modules.as_list()?;

    let matched: Vec<String> = model
        .named_modules()
        .filter(|(name, module)| {
            matches!(module, Module::Linear(_) | Module::Lora(_))
                && targets.iter().any(|t| matches_target(name, t))
        })
        .map(|(name, _)| name)
        .collect();
    if matched.is_empty() {
        return Err(LoraXsError::NoMatchingModules { target_modules: targets.to_vec() });
    }

    for name in &matched {
        let slot = model.get_submodule_mut(name)?;
        if matches!(slot, Module::Linear(_)) {
            if let Module::Linear(linear) = std::mem::replace(slot, Container::new().into()) {
                *slot = Module::Lora(LoraLinear::new(linear));
            }
        }
        if let Module::Lora(layer) = slot {
            layer.add_adapter(adapter_name, config.r, config.lora_alpha, rng)?;
        }
        tracing::debug!(module = %name, adapter = adapter_name, r = config.r, "injected adapter");
    }

    model.for_each_parameter_mut(|name, p| {
        if !name.split('.').any(|part| part.starts_with("lora_")) {
            p.set_requires_grad(false);
        }
    });

    tracing::info!(
        adapter = adapter_name,
        modules = matched.len(),
        trainable = model.num_trainable_parameters(),
        "LoRA adapter injected"
    );
    Ok(matched)
}
