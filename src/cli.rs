//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Typed, validated, layered application configuration.
#[derive(Parser, Debug)]
#[command(name = "envstack", version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML schema declaration.
    #[arg(short, long, env = "ENVSTACK_SCHEMA")]
    pub schema: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level based on verbosity flags.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the configuration once and print it; exits non-zero on any error.
    Check(CheckArgs),

    /// Print a .env.example file for the schema.
    Example,

    /// Print Markdown documentation for the schema.
    Docs,

    /// Print the built configuration as JSON or YAML.
    Show(ShowArgs),

    /// Keep the configuration live and print every successful reload.
    Watch(WatchArgs),
}

/// Where raw values come from.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Source file to layer in (dotenv, .json, .yaml, .toml); later files win.
    #[arg(short = 'e', long = "env-file")]
    pub env_files: Vec<PathBuf>,

    /// Add <DIR>/.env and <DIR>/.env.<ENVSTACK_MODE> before any --env-file.
    #[arg(long)]
    pub profile_dir: Option<PathBuf>,

    /// Ignore the process environment.
    #[arg(long, default_value = "false")]
    pub no_env: bool,
}

/// Arguments for the check subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Print secret values instead of masking them.
    #[arg(long, default_value = "false")]
    pub reveal: bool,
}

/// Output formats for `show`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

/// Arguments for the show subcommand.
#[derive(Args, Debug)]
pub struct ShowArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Print secret values instead of masking them.
    #[arg(long, default_value = "false")]
    pub reveal: bool,
}

/// Arguments for the watch subcommand.
#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Milliseconds between change checks.
    #[arg(long, default_value = "1000")]
    pub interval_ms: u64,
}
