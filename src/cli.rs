// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `tierflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tierflow",
    version,
    about = "Run cron-triggered tasks as tiers of concurrent jobs.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Tierflow.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Tierflow.toml")]
    pub config: String,

    /// Run every task once immediately instead of waiting for cron, then exit.
    #[arg(long)]
    pub once: bool,

    /// Only schedule the task with this name.
    #[arg(long, value_name = "NAME")]
    pub task: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TIERFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate + plan, print the tiers, but don't run any jobs.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
