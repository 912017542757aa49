// src/tier/mod.rs

//! Tiered execution core.
//!
//! - [`descriptor`] turns a step record into a schedulable [`JobUnit`].
//! - [`planner`] orders a task's units into a [`TierQueue`].
//! - [`state`] is the pure per-run state machine (queue, status, running
//!   set).
//! - [`tracker`] wraps that state in a lock, listens for completions and
//!   submits each tier to the scheduler.
//! - [`status`] and [`tracker_step`] hold the small result/state types.

pub mod descriptor;
pub mod planner;
pub mod state;
pub mod status;
pub mod tracker;
pub mod tracker_step;

pub use descriptor::{build_job_unit, JobData, JobUnit};
pub use planner::{plan, TierQueue};
pub use state::TrackerState;
pub use status::{ExecutionStatus, RunPhase};
pub use tracker::ExecutionTracker;
pub use tracker_step::TrackerStep;
