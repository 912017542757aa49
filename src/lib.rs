// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod scheduler;
pub mod task;
pub mod tier;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{plan_all, run_once, run_scheduled, Engine, PlannedTask, SkippedTask};
use crate::exec::{FunctionRegistry, HandlerContext, HandlerRegistry};
use crate::scheduler::local::{LocalScheduler, LocalSchedulerOptions};
use crate::task::tasks_from_config;

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    run_with_functions(args, FunctionRegistry::new()).await
}

/// Like [`run`], with custom functions available to `custom_function`
/// steps.
///
/// This wires together:
/// - config loading and planning
/// - the local scheduler and its job handlers
/// - the engine, driven once or from cron
/// - Ctrl-C handling
pub async fn run_with_functions(args: CliArgs, functions: FunctionRegistry) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    info!(
        project = %cfg.project_name,
        tasks = cfg.task.len(),
        datasources = cfg.datasource.len(),
        "configuration loaded"
    );

    let tasks = tasks_from_config(&cfg);
    let (planned, skipped) = plan_all(&tasks);

    if args.dry_run {
        print_dry_run(&cfg, &planned, &skipped);
        return Ok(());
    }

    let root_dir = config_root_dir(&config_path);
    let registry = HandlerRegistry::builtin(functions);
    let ctx = HandlerContext::from_config(&cfg, root_dir);
    let scheduler = LocalScheduler::spawn(
        registry,
        ctx,
        LocalSchedulerOptions::from_config(&cfg.config),
    );

    let engine = Arc::new(Engine::new(planned, skipped, scheduler));
    let only = args.task.as_deref();

    if args.once {
        let summary = run_once(Arc::clone(&engine), only).await?;
        if !summary.all_succeeded() {
            bail!("runs did not complete: {}", summary.failed_tasks().join(", "));
        }
        return Ok(());
    }

    // Ctrl-C → graceful shutdown of the cron loops.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    run_scheduled(engine, only, shutdown_rx).await?;
    Ok(())
}

/// Directory that relative step paths are resolved against.
///
/// - If the config path has a non-empty parent (e.g. "etl/Tierflow.toml"),
///   that directory is used.
/// - For a bare filename like "Tierflow.toml" the current working
///   directory is used.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Print tasks and their tiers without executing anything.
fn print_dry_run(cfg: &ConfigFile, planned: &[PlannedTask], skipped: &[SkippedTask]) {
    println!("tierflow dry-run");
    if !cfg.project_name.is_empty() {
        println!("  project = {}", cfg.project_name);
    }
    println!("  config.max_workers = {}", cfg.config.max_workers);
    println!("  config.query_command = {}", cfg.config.query_command);
    if let Some(secs) = cfg.config.job_timeout_secs {
        println!("  config.job_timeout_secs = {secs}");
    }
    println!();

    println!("tasks ({}):", planned.len());
    for p in planned {
        println!("  - {} (id {}, cron \"{}\")", p.task.name, p.task.id, p.schedule);
        for tier in p.queue.tiers() {
            let steps: Vec<String> = p
                .queue
                .iter()
                .filter(|u| u.tier == tier)
                .map(|u| format!("{} [{}]", u.name, u.type_tag))
                .collect();
            println!("      tier {tier}: {}", steps.join(", "));
        }
    }

    if !skipped.is_empty() {
        println!();
        println!("skipped ({}):", skipped.len());
        for s in skipped {
            println!("  - {}: {}", s.name, s.reason);
        }
    }

    debug!("dry-run complete (no execution)");
}
