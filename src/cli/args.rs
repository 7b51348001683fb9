//! CLI argument parsing
//!
//! ```bash
//! lora-xs adapt --rank 4 --targets query,value
//! lora-xs adapt --config config/reconstruct_config.yaml --format json
//! lora-xs validate config/reconstruct_config.yaml --detailed
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// LoRA-XS: SVD-initialized adapters with a trainable latent matrix
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "lora-xs")]
#[command(version)]
#[command(about = "Turn LoRA adapters into LoRA-XS: frozen SVD factors around a trainable r x r matrix")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Build a synthetic encoder, inject LoRA and run the LoRA-XS initialization
    Adapt(AdaptArgs),

    /// Validate a reconstruction configuration file
    Validate(ValidateArgs),
}

/// Arguments for the adapt command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct AdaptArgs {
    /// Reconstruction config (YAML); built-in defaults when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// LoRA rank, also used as the SVD rank
    #[arg(short, long, default_value_t = 4)]
    pub rank: usize,

    /// LoRA alpha
    #[arg(short, long, default_value_t = 4.0)]
    pub alpha: f32,

    /// Encoder layers in the synthetic model
    #[arg(long, default_value_t = 2)]
    pub layers: usize,

    /// Hidden width of the synthetic model
    #[arg(long, default_value_t = 64)]
    pub hidden: usize,

    /// Target module suffixes
    #[arg(short, long, value_delimiter = ',', default_value = "query,value")]
    pub targets: Vec<String>,

    /// Adapter name
    #[arg(long, default_value = "default")]
    pub adapter: String,

    /// Reconstruction method
    #[arg(short, long, default_value = "svd")]
    pub method: String,

    /// Seed for the model weights and re-initialization draws
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Report format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to the YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Print the resolved configuration
    #[arg(short, long)]
    pub detailed: bool,
}

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {s}. Valid formats: text, json")),
        }
    }
}

/// Parse arguments from an iterator (for testing)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_adapt_defaults() {
        let cli = parse_args(["lora-xs", "adapt"]).unwrap();
        match cli.command {
            Command::Adapt(args) => {
                assert_eq!(args.rank, 4);
                assert_eq!(args.targets, ["query", "value"]);
                assert_eq!(args.adapter, "default");
                assert_eq!(args.format, OutputFormat::Text);
                assert!(args.config.is_none());
            }
            _ => panic!("Expected Adapt command"),
        }
    }

    #[test]
    fn test_parse_adapt_overrides() {
        let cli = parse_args([
            "lora-xs",
            "-v",
            "adapt",
            "--rank",
            "8",
            "--targets",
            "query,attention.output.dense",
            "--seed",
            "3",
            "--format",
            "json",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Adapt(args) => {
                assert_eq!(args.rank, 8);
                assert_eq!(args.targets, ["query", "attention.output.dense"]);
                assert_eq!(args.seed, Some(3));
                assert_eq!(args.format, OutputFormat::Json);
            }
            _ => panic!("Expected Adapt command"),
        }
    }

    #[test]
    fn test_parse_validate() {
        let cli = parse_args(["lora-xs", "validate", "cfg.yaml", "--detailed"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Validate(ValidateArgs { config: PathBuf::from("cfg.yaml"), detailed: true })
        );
    }

    #[test]
    fn test_bad_format_rejected() {
        assert!(parse_args(["lora-xs", "adapt", "--format", "xml"]).is_err());
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
