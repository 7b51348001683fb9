//! LoRA-XS CLI
//!
//! # Usage
//!
//! ```bash
//! # Adapt a synthetic encoder with the built-in defaults
//! lora-xs adapt --rank 4 --targets query,value
//!
//! # Use a reconstruction config and print JSON
//! lora-xs adapt --config config/reconstruct_config.yaml --format json
//!
//! # Validate config
//! lora-xs validate config/reconstruct_config.yaml --detailed
//! ```

use clap::Parser;
use lora_xs::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
