//! Error types with actionable diagnostics.
//!
//! Every variant is fatal to an adaptation pass: a partially adapted model
//! would train in an inconsistent state, so nothing here is retried or
//! downgraded to a warning.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for lora-xs operations.
pub type Result<T> = std::result::Result<T, LoraXsError>;

/// Errors raised while reconstructing and grafting LoRA-XS adapters.
#[derive(Error, Debug)]
pub enum LoraXsError {
    /// Reconstruction method identifier is not in the supported set.
    #[error("Unsupported reconstruction method: '{method}'\n  → Supported methods: svd")]
    UnsupportedMethod { method: String },

    /// Reconstruction mode other than `separated`.
    #[error("Unsupported reconstruction mode: '{mode}'\n  → The only supported mode is: separated")]
    UnsupportedMode { mode: String },

    /// A matched module is not a dense LoRA linear layer.
    #[error("Module '{module}' is a {kind}; only dense LoRA linear layers can be initialized\n  → Narrow target_modules so it does not match this module")]
    UnsupportedTargetType { module: String, kind: String },

    /// `target_modules` was given as a single string.
    #[error("target_modules must be a list of suffixes, got the single string '{target}'\n  → Write target_modules: [\"{target}\"]")]
    InvalidTargetSpec { target: String },

    /// No module in the model matched the configured suffixes.
    #[error("Target modules {target_modules:?} not found in the base model\n  → Check the target modules against the model's module names and try again")]
    NoMatchingModules { target_modules: Vec<String> },

    /// The model needs a capability this build does not provide.
    #[error("Missing dependency: {capability}\n  → {hint}")]
    MissingDependency { capability: String, hint: String },

    /// Adapter name has no configuration entry.
    #[error("No adapter configuration named '{adapter}'\n  → Known adapters: {known:?}")]
    UnknownAdapter { adapter: String, known: Vec<String> },

    /// Matched layer does not carry the requested adapter.
    #[error("Module '{module}' has no adapter named '{adapter}'\n  → Inject the adapter before initializing it")]
    AdapterNotAttached { module: String, adapter: String },

    /// Latent mapping already installed for this adapter.
    #[error("Adapter '{adapter}' on module '{module}' already routes through a latent matrix")]
    AlreadyLatent { module: String, adapter: String },

    /// Requested rank cannot be represented by the weight.
    #[error("Invalid rank {rank} for a {rows}x{cols} weight\n  → Rank must be between 1 and min({rows}, {cols})")]
    InvalidRank { rank: usize, rows: usize, cols: usize },

    /// Tensor shape mismatch.
    #[error("Tensor shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { context: String, expected: Vec<usize>, actual: Vec<usize> },

    /// Qualified module name does not resolve.
    #[error("Module '{name}' not found in the model")]
    ModuleNotFound { name: String },

    /// Configuration value is invalid.
    #[error("Invalid configuration value for '{field}': {message}\n  → {suggestion}")]
    ConfigValue { field: String, message: String, suggestion: String },

    /// Configuration file could not be parsed.
    #[error("Invalid configuration syntax in {path}:\n  {message}\n  → Check YAML syntax at the indicated line")]
    ConfigParsing { path: PathBuf, message: String },

    /// IO error with context.
    #[error("IO error: {context}\n  Cause: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Numerical routine failed.
    #[error("Computation failed: {message}")]
    Computation { message: String },
}

impl LoraXsError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }

    /// Create a configuration value error.
    pub fn config_value(
        field: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::ConfigValue {
            field: field.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Check if this error stems from user configuration rather than the model
    /// or the numerics.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedMethod { .. }
                | Self::UnsupportedMode { .. }
                | Self::InvalidTargetSpec { .. }
                | Self::NoMatchingModules { .. }
                | Self::UnknownAdapter { .. }
                | Self::InvalidRank { .. }
                | Self::ConfigValue { .. }
                | Self::ConfigParsing { .. }
        )
    }

    /// Get the error code for structured output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedMethod { .. } => "X001",
            Self::UnsupportedMode { .. } => "X002",
            Self::UnsupportedTargetType { .. } => "X003",
            Self::InvalidTargetSpec { .. } => "X004",
            Self::NoMatchingModules { .. } => "X005",
            Self::MissingDependency { .. } => "X006",
            Self::UnknownAdapter { .. } => "X010",
            Self::AdapterNotAttached { .. } => "X011",
            Self::AlreadyLatent { .. } => "X012",
            Self::InvalidRank { .. } => "X020",
            Self::ShapeMismatch { .. } => "X021",
            Self::ModuleNotFound { .. } => "X022",
            Self::ConfigValue { .. } => "X030",
            Self::ConfigParsing { .. } => "X031",
            Self::Io { .. } => "X040",
            Self::Computation { .. } => "X050",
        }
    }
}
