// src/tier/status.rs

//! Per-step execution status and per-run phase.

use std::fmt;

/// Status of one step within one task run.
///
/// Transitions: `New -> Processing -> {Completed | Failed}`. A step whose
/// submission is rejected before it starts goes back to `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Not submitted (yet, or ever if an earlier tier failed).
    New,
    /// Submitted to the scheduler, waiting for its completion notification.
    Processing,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::New => "new",
            ExecutionStatus::Processing => "processing",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Where a task run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    /// Tracker built but `start` not called.
    NotStarted,
    /// The given tier is in flight.
    Running { tier: u32 },
    /// Every tier completed successfully.
    Completed,
    /// The given tier finished with failures; later tiers were never
    /// submitted.
    Halted { tier: u32, failed: Vec<String> },
    /// The scheduler refused the run before any step was submitted.
    Aborted { reason: String },
    /// The task had no steps.
    Empty,
}

impl RunPhase {
    /// Whether the run will never change phase again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunPhase::NotStarted | RunPhase::Running { .. })
    }

    /// Whether the run ended without any failure.
    pub fn is_success(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Empty)
    }
}
