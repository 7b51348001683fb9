//! Validate command implementation

use crate::cli::logging::log;
use crate::cli::{LogLevel, ValidateArgs};
use crate::reconstruct::ReconstructConfig;

/// Format the reconstruction settings as a string
pub fn format_reconstruction_info(config: &ReconstructConfig) -> String {
    let mut lines = vec![
        format!("  Mode: {}", config.reconstr_mode),
        format!("  Latent matrix (r-squared): {}", config.r_squared),
        format!("  Half-init decoder: {}", config.half_init_dec),
        format!("  Random factor init: {}", config.replacement_module_random_init),
    ];
    let sigma_label = if config.r_squared { "Latent sigma" } else { "Encoder sigma" };
    lines.push(format!("  {sigma_label}: {:e}", config.latent_init_sigma));
    lines.push(format!("  Sigma placement: {:?}", config.sigma_placement));
    lines.join("\n")
}

/// Format the SVD section as a string
pub fn format_svd_info(config: &ReconstructConfig) -> String {
    match &config.svd {
        Some(svd) => {
            let rank = svd.rank.map_or_else(|| "adapter r".to_string(), |r| r.to_string());
            format!(
                "  SVD rank: {rank}\n  Power iterations: {}\n  Random state: {}",
                svd.n_iter, svd.random_state
            )
        }
        None => "  SVD: not configured".to_string(),
    }
}

/// Format per-module rank overrides as a string
pub fn format_overrides(config: &ReconstructConfig) -> String {
    if config.rank_overrides.is_empty() {
        return "  Rank overrides: none".to_string();
    }
    let mut lines = vec!["  Rank overrides:".to_string()];
    for (name, rank) in &config.rank_overrides {
        lines.push(format!("    {name}: {rank}"));
    }
    lines.join("\n")
}

pub fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<(), String> {
    log(level, LogLevel::Normal, &format!("Validating config: {}", args.config.display()));

    let config = ReconstructConfig::from_file(&args.config)
        .map_err(|e| format!("Config validation failed: {e}"))?;

    log(level, LogLevel::Normal, "✓ Configuration is valid");

    if args.detailed {
        log(level, LogLevel::Normal, "");
        log(level, LogLevel::Normal, "Reconstruction:");
        log(level, LogLevel::Normal, &format_reconstruction_info(&config));
        log(level, LogLevel::Normal, "");
        log(level, LogLevel::Normal, "SVD:");
        log(level, LogLevel::Normal, &format_svd_info(&config));
        log(level, LogLevel::Normal, &format_overrides(&config));
    }

    Ok(())
}
