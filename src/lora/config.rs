//! LoRA adapter configuration
//!
//! Serializes with the same field names as a PEFT `LoraConfig`, so an
//! `adapter_config.json` fragment deserializes directly.

use crate::error::{LoraXsError, Result};
use serde::{Deserialize, Serialize};

/// Which modules an adapter targets
///
/// PEFT accepts either a list of name suffixes or a single string. Only the
/// list form can drive a LoRA-XS pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetModules {
    /// A single pattern
    Single(String),
    /// Ordered list of name suffixes
    List(Vec<String>),
}

impl TargetModules {
    /// Suffix list, or [`LoraXsError::InvalidTargetSpec`] for the single-string form
    pub fn as_list(&self) -> Result<&[String]> {
        match self {
            Self::List(list) => Ok(list),
            Self::Single(target) => {
                Err(LoraXsError::InvalidTargetSpec { target: target.clone() })
            }
        }
    }
}

impl<S: Into<String>> FromIterator<S> for TargetModules {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::List(iter.into_iter().map(Into::into).collect())
    }
}

/// Per-adapter LoRA hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// LoRA rank
    pub r: usize,
    /// Scaling numerator; the adapter output is multiplied by `lora_alpha / r`
    pub lora_alpha: f32,
    /// Modules to wrap
    pub target_modules: TargetModules,
}

impl AdapterConfig {
    /// Config targeting a list of suffixes
    pub fn new<I, S>(r: usize, lora_alpha: f32, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { r, lora_alpha, target_modules: targets.into_iter().collect() }
    }

    /// `lora_alpha / r`
    pub fn scaling(&self) -> f32 {
        self.lora_alpha / self.r as f32
    }

    pub fn validate(&self) -> Result<()> {
        if self.r == 0 {
            return Err(LoraXsError::config_value(
                "r",
                "LoRA rank must be at least 1",
                "Typical ranks are 4, 8, 16 or 32",
            ));
        }
        if !(self.lora_alpha.is_finite() && self.lora_alpha > 0.0) {
            return Err(LoraXsError::config_value(
                "lora_alpha",
                format!("must be a positive finite number, got {}", self.lora_alpha),
                "lora_alpha is often set equal to r",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling() {
        let config = AdapterConfig::new(4, 8.0, ["query", "value"]);
        assert_eq!(config.scaling(), 2.0);
    }

    #[test]
    fn test_single_string_target_rejected() {
        let config = AdapterConfig {
            r: 4,
            lora_alpha: 4.0,
            target_modules: TargetModules::Single("query".to_string()),
        };
        let err = config.target_modules.as_list().unwrap_err();
        assert!(matches!(err, LoraXsError::InvalidTargetSpec { ref target } if target == "query"));
    }

    #[test]
    fn test_deserialize_both_forms() {
        let list: AdapterConfig =
            serde_json::from_str(r#"{"r": 8, "lora_alpha": 16, "target_modules": ["query", "value"]}"#)
                .unwrap();
        assert_eq!(list.target_modules.as_list().unwrap(), ["query", "value"]);

        let single: AdapterConfig =
            serde_json::from_str(r#"{"r": 8, "lora_alpha": 16, "target_modules": "query"}"#).unwrap();
        assert!(matches!(single.target_modules, TargetModules::Single(_)));
    }

    #[test]
    fn test_validate() {
        assert!(AdapterConfig::new(4, 4.0, ["q"]).validate().is_ok());
        assert!(AdapterConfig::new(0, 4.0, ["q"]).validate().is_err());
        assert!(AdapterConfig::new(4, f32::NAN, ["q"]).validate().is_err());
    }
}
