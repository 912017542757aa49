// src/engine/runtime.rs

//! Async drivers around [`Engine`]: run everything once, or fire runs
//! from each task's cron schedule until shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, TierflowError};
use crate::scheduler::CronSchedule;

use super::{Engine, RunOutcome};

/// Result of [`run_once`].
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Runs that reached a terminal phase, sorted by task name.
    pub outcomes: Vec<RunOutcome>,
    /// `(task, error)` for runs that could not be started.
    pub errors: Vec<(String, String)>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.errors.is_empty() && self.outcomes.iter().all(RunOutcome::is_success)
    }

    pub fn failed_tasks(&self) -> Vec<&str> {
        let mut failed: Vec<&str> = self
            .outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.task.as_str())
            .chain(self.errors.iter().map(|(task, _)| task.as_str()))
            .collect();
        failed.sort_unstable();
        failed
    }
}

/// Run the selected tasks (all of them when `only` is `None`) concurrently,
/// each exactly once, and wait for every run to finish.
pub async fn run_once(engine: Arc<Engine>, only: Option<&str>) -> Result<RunSummary> {
    let names = select_tasks(&engine, only)?;
    info!(tasks = ?names, "running tasks once");

    let mut set = JoinSet::new();
    for name in names {
        let engine = Arc::clone(&engine);
        set.spawn(async move {
            let result = engine.run_task(&name).await;
            (name, result)
        });
    }

    let mut summary = RunSummary::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(outcome))) => {
                info!(
                    task = %outcome.task,
                    run_id = outcome.run_id,
                    phase = ?outcome.phase,
                    "run finished"
                );
                summary.outcomes.push(outcome);
            }
            Ok((name, Err(err))) => {
                error!(task = %name, error = %err, "run could not be started");
                summary.errors.push((name, err.to_string()));
            }
            Err(join_err) => {
                error!(error = %join_err, "run task panicked");
                summary
                    .errors
                    .push(("<unknown>".to_string(), join_err.to_string()));
            }
        }
    }

    summary.outcomes.sort_by(|a, b| a.task.cmp(&b.task));
    info!(
        succeeded = summary.outcomes.iter().filter(|o| o.is_success()).count(),
        failed = summary.failed_tasks().len(),
        "all runs finished"
    );
    Ok(summary)
}

/// Fire runs from each selected task's cron schedule until `shutdown`
/// becomes `true` (or its sender is dropped).
///
/// Runs already in flight at shutdown are left to finish on their own.
pub async fn run_scheduled(
    engine: Arc<Engine>,
    only: Option<&str>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let names = select_tasks(&engine, only)?;
    if names.is_empty() {
        warn!("no runnable tasks; nothing to schedule");
        return Ok(());
    }

    let mut set = JoinSet::new();
    for name in names {
        let Some(planned) = engine.planned_task(&name) else {
            continue;
        };
        let schedule = planned.schedule.clone();
        set.spawn(cron_loop(
            Arc::clone(&engine),
            name,
            schedule,
            shutdown.clone(),
        ));
    }

    while let Some(joined) = set.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "cron loop panicked");
        }
    }

    info!("scheduler stopped");
    Ok(())
}

async fn cron_loop(
    engine: Arc<Engine>,
    name: String,
    schedule: CronSchedule,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(task = %name, cron = %schedule, "cron loop started");
    let mut last_fire: Option<NaiveDateTime> = None;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let now = Local::now().naive_local();
        // The timer may wake just before the wall clock reaches `next`.
        let from = last_fire.map_or(now, |fired| fired.max(now));
        let Some(next) = schedule.next_after(from) else {
            warn!(task = %name, cron = %schedule, "cron expression never fires; loop stopped");
            break;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!(task = %name, next = %next, "waiting for next fire time");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }
        last_fire = Some(next);

        match engine.start_run(&name) {
            Ok(Some(tracker)) => {
                debug!(task = %name, run_id = tracker.run_id(), "cron run started")
            }
            Ok(None) => {}
            Err(err) => error!(task = %name, error = %err, "cron run failed to start"),
        }
    }

    info!(task = %name, "cron loop finished");
}

fn select_tasks(engine: &Engine, only: Option<&str>) -> Result<Vec<String>> {
    match only {
        Some(name) => {
            if engine.planned_task(name).is_none() {
                return Err(TierflowError::TaskNotFound(name.to_string()));
            }
            Ok(vec![name.to_string()])
        }
        None => Ok(engine.task_names().into_iter().map(str::to_string).collect()),
    }
}
