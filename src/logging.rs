// src/logging.rs

//! Process-wide `tracing` subscriber for the `tierflow` binary.
//!
//! Engine events carry `task`, `run_id`, `step` and `tier` fields, and
//! completions arrive on worker threads, so thread ids are printed too.
//! Everything goes to STDERR: `--dry-run` prints its tier listing on
//! STDOUT.
//!
//! The level is taken from `--log-level`, else from `TIERFLOW_LOG`
//! (`error`, `warn`/`warning`, `info`, `debug`, `trace`), else `info`.

use std::str::FromStr;

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

const LEVEL_ENV: &str = "TIERFLOW_LOG";

/// Install the global subscriber. Call once, before the engine starts.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let level = cli_level
        .map(Level::from)
        .or_else(|| std::env::var(LEVEL_ENV).ok().and_then(|s| level_from_env(&s)))
        .unwrap_or(Level::INFO);

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

impl From<LogLevel> for Level {
    fn from(lvl: LogLevel) -> Self {
        match lvl {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

fn level_from_env(raw: &str) -> Option<Level> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("warning") {
        return Some(Level::WARN);
    }
    Level::from_str(raw).ok()
}
