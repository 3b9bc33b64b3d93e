//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Notify Dispatcher - rate-limited delivery of chat notifications
#[derive(Parser, Debug)]
#[command(
    name = "notify-dispatcher",
    author,
    version,
    about = "Rate-limited notification dispatcher",
    long_about = "Queues outbound chat notifications by priority and delivers them through a\n\
                  transport without tripping platform rate limits.\n\n\
                  Applies a global burst cap, per-recipient backoff, a circuit breaker,\n\
                  short-TTL deduplication and announcement merging."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "NOTIFY_DISPATCHER_VERBOSE")]
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
        env = "NOTIFY_DISPATCHER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dispatcher, feeding it notification requests
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "NOTIFY_DISPATCHER_CONFIG"
    )]
    pub config: PathBuf,

    /// JSON-lines file of notification requests (stdin if omitted)
    #[arg(short, long, env = "NOTIFY_DISPATCHER_INPUT")]
    pub input: Option<PathBuf>,

    /// Seconds to keep delivering after input ends before draining (0 = drain at once)
    #[arg(long, default_value = "30", env = "NOTIFY_DISPATCHER_LINGER")]
    pub linger: u64,

    /// Seconds between status log lines (0 = disabled)
    #[arg(long, default_value = "10", env = "NOTIFY_DISPATCHER_STATUS_INTERVAL")]
    pub status_interval: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "NOTIFY_DISPATCHER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
