// src/engine/mod.rs

//! Orchestration engine for tierflow.
//!
//! This module ties together:
//! - planning every configured task once at startup
//! - one [`ExecutionTracker`] per task run, sharing a single scheduler
//! - the drivers that start runs: immediately (`--once`) or from cron
//!
//! Run bookkeeping lives in [`core`]; the async drivers are implemented in
//! [`runtime`].

use std::collections::BTreeMap;

use tracing::{error, warn};

use crate::errors::{Result, TierflowError};
use crate::scheduler::CronSchedule;
use crate::task::Task;
use crate::tier::{plan, ExecutionStatus, RunPhase, TierQueue};

pub mod core;
pub mod runtime;

pub use core::Engine;
pub use runtime::{run_once, run_scheduled, RunSummary};

/// A task that planned successfully.
#[derive(Debug, Clone)]
pub struct PlannedTask {
    pub task: Task,
    pub schedule: CronSchedule,
    pub queue: TierQueue,
}

/// A task left out of the engine, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTask {
    pub name: String,
    pub reason: String,
}

/// Plan every task.
///
/// A task with no steps is skipped with a warning; a task with an invalid
/// step or cron expression is skipped with an error. Neither affects the
/// other tasks.
pub fn plan_all(tasks: &[Task]) -> (Vec<PlannedTask>, Vec<SkippedTask>) {
    let mut planned = Vec::new();
    let mut skipped = Vec::new();

    for task in tasks {
        let result = task
            .cron
            .parse::<CronSchedule>()
            .and_then(|schedule| plan(task).map(|queue| (schedule, queue)));

        match result {
            Ok((schedule, queue)) => planned.push(PlannedTask {
                task: task.clone(),
                schedule,
                queue,
            }),
            Err(err) => {
                match &err {
                    TierflowError::EmptyTask(_) => {
                        warn!(task = %task.name, "task has no steps; skipping")
                    }
                    other => error!(task = %task.name, error = %other, "task skipped"),
                }
                skipped.push(SkippedTask {
                    name: task.name.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    (planned, skipped)
}

/// Final state of one task run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub task: String,
    pub run_id: u64,
    pub phase: RunPhase,
    pub statuses: BTreeMap<String, ExecutionStatus>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.phase.is_success()
    }

    /// `Err(StepExecution)` for a halted run, `Err(SchedulerRegistration)`
    /// for an aborted one.
    pub fn into_result(self) -> Result<Self> {
        match &self.phase {
            RunPhase::Halted { tier, failed } => Err(TierflowError::StepExecution {
                task: self.task.clone(),
                step: failed.first().cloned().unwrap_or_default(),
                tier: *tier,
            }),
            RunPhase::Aborted { reason } => {
                Err(TierflowError::SchedulerRegistration(reason.clone()))
            }
            _ => Ok(self),
        }
    }
}
