//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Outflow - batched output buffering and dispatch for log ingestion
#[derive(Parser, Debug)]
#[command(
    name = "outflow",
    author,
    version,
    about = "Batched output buffering and dispatch for log ingestion",
    long_about = "Buffers ingested events into weighted batches, fans every batch out to \n\
                  the configured outputs, routes events to the outputs of their streams \n\
                  and commits journal offsets once a batch has been handed over."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "OUTFLOW_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "OUTFLOW_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Feed events through the configured dispatcher
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "outflow.toml", env = "OUTFLOW_CONFIG")]
    pub config: PathBuf,

    /// Newline-delimited JSON events to read ("-" or absent = stdin)
    #[arg(short, long, env = "OUTFLOW_INPUT")]
    pub input: Option<PathBuf>,

    /// Number of concurrent producer tasks writing to the dispatcher
    #[arg(
        long,
        default_value = "4",
        value_parser = clap::value_parser!(u16).range(1..),
        env = "OUTFLOW_PRODUCERS"
    )]
    pub producers: u16,

    /// Offset assigned to the first event read
    #[arg(long, default_value = "0", env = "OUTFLOW_START_OFFSET")]
    pub start_offset: u64,

    /// Stop reading after this many seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "OUTFLOW_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and build outputs, then exit without reading events
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "OUTFLOW_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "outflow.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "outflow.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show persisted stream outputs
    #[arg(long)]
    pub outputs: bool,

    /// Show streams and their attached outputs
    #[arg(long)]
    pub streams: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
