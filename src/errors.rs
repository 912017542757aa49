// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Planning-time problems (`InvalidStep`, `EmptyTask`) are returned
//! synchronously before anything is submitted. Run-time step failures are
//! only ever logged by the tracker; `StepExecution` exists so callers that
//! await a run can turn a halted run into an error of their own.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TierflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid step '{step}' in task '{task}': {reason}")]
    InvalidStep {
        task: String,
        step: String,
        reason: String,
    },

    #[error("Task '{0}' has no steps")]
    EmptyTask(String),

    #[error("Step '{step}' (tier {tier}) of task '{task}' failed")]
    StepExecution {
        task: String,
        step: String,
        tier: u32,
    },

    #[error("Scheduler registration error: {0}")]
    SchedulerRegistration(String),

    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TierflowError {
    /// Shorthand used by the descriptor builder and planner.
    pub fn invalid_step(task: &str, step: &str, reason: impl Into<String>) -> Self {
        TierflowError::InvalidStep {
            task: task.to_string(),
            step: step.to_string(),
            reason: reason.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TierflowError>;
