//! CLI command implementations

mod adapt;
mod validate;


use crate::cli::logging::init_tracing;
use crate::cli::LogLevel;
use crate::cli::{Cli, Command};

/// Run a CLI command
pub fn run_command(cli: Cli) -> Result<(), String> {
    let log_level = if cli.quiet {
        LogLevel::Quiet
    } else if cli.verbose {
        LogLevel::Verbose
    } else {
        LogLevel::Normal
    };
    init_tracing(log_level);

    match cli.command {
        Command::Adapt(args) => adapt::run_adapt(args, log_level),
        Command::Validate(args) => validate::run_validate(args, log_level),
    }
}
