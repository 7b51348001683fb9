//! CLI module for lora-xs
//!
//! This module contains the argument types and command handlers.

mod args;
mod commands;
mod logging;

pub use args::{parse_args, AdaptArgs, Cli, Command, OutputFormat, ValidateArgs};
pub use commands::run_command;
pub use logging::{init_tracing, LogLevel};
