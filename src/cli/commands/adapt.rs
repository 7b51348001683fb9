//! Adapt command implementation

use crate::cli::logging::log;
use crate::cli::{AdaptArgs, LogLevel, OutputFormat};
use crate::init::rng_from_seed;
use crate::lora::{inject_adapter, AdapterConfig};
use crate::nn::zoo::toy_encoder;
use crate::reconstruct::{ReconstructConfig, ReconstructionMethod};
use crate::xs::{find_and_initialize, AdaptationReport};
use std::collections::BTreeMap;

/// Build the synthetic encoder, inject LoRA and run the LoRA-XS pass
pub fn adapt(args: &AdaptArgs) -> crate::Result<AdaptationReport> {
    let mut config = match &args.config {
        Some(path) => ReconstructConfig::from_file(path)?,
        None => ReconstructConfig::default(),
    };
    let has_rank = config.svd.as_ref().is_some_and(|svd| svd.rank.is_some());
    if !has_rank {
        config = config.with_rank(args.rank);
    }
    if let Some(seed) = args.seed {
        if config.init_seed.is_none() {
            config = config.with_init_seed(seed);
        }
    }
    let method: ReconstructionMethod = args.method.parse()?;

    let adapter = AdapterConfig::new(args.rank, args.alpha, args.targets.iter().cloned());
    adapter.validate()?;

    let seed = args.seed.unwrap_or(0);
    let mut model = toy_encoder(args.layers, args.hidden, seed);
    inject_adapter(&mut model, &args.adapter, &adapter, &mut rng_from_seed(Some(seed)))?;

    let configs = BTreeMap::from([(args.adapter.clone(), adapter)]);
    find_and_initialize(&mut model, &configs, &args.adapter, method, &config)
}

/// Run the adapt command and print the report
pub fn run_adapt(args: AdaptArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Verbose,
        &format!(
            "Synthetic encoder: {} layer(s), hidden {}; targets {:?}",
            args.layers, args.hidden, args.targets
        ),
    );

    let report = adapt(&args).map_err(|e| format!("Adaptation failed: {e}"))?;

    match args.format {
        OutputFormat::Text => log(level, LogLevel::Normal, &report.to_string()),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| format!("Failed to serialize report: {e}"))?;
            println!("{json}");
        }
    }
    Ok(())
}
