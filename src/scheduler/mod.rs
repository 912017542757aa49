// src/scheduler/mod.rs

//! Contract between the tier engine and whatever actually runs jobs.
//!
//! - [`SchedulerAdapter`] is what the execution tracker talks to: submit a
//!   unit, trigger it, and register for completion notifications.
//! - [`local`] provides `LocalScheduler`, an in-process implementation
//!   backed by Tokio tasks and the job handler registry.
//! - [`cron`] parses cron expressions and computes fire times.
//!
//! Tests swap in a recording fake (see `tierflow-test-utils`).

pub mod cron;
pub mod local;

use std::fmt;
use std::sync::Arc;

use crate::errors::Result;
use crate::tier::JobUnit;

pub use cron::CronSchedule;
pub use local::LocalScheduler;

/// Identity of a submitted job: `(group, name)` = `(task, step)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub group: String,
    pub name: String,
}

impl JobKey {
    pub fn new(group: &str, name: &str) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Handle for one listener registration, returned by
/// [`SchedulerAdapter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receives `(step, success)` for every job of the group it was registered
/// for.
///
/// Implementations must tolerate concurrent calls for different steps and
/// calls in any order.
pub trait CompletionListener: Send + Sync {
    fn on_completion(&self, step: &str, success: bool);
}

/// Capabilities the engine needs from a job scheduler.
///
/// Every method may be called from any thread, including from inside a
/// `CompletionListener::on_completion` callback. Failures are reported as
/// `TierflowError::SchedulerRegistration`.
pub trait SchedulerAdapter: Send + Sync {
    /// Hand a copy of `unit` to the scheduler; returns its handle.
    fn submit(&self, unit: JobUnit) -> Result<JobKey>;

    /// Run a previously submitted unit now, regardless of any cron.
    fn trigger(&self, handle: &JobKey) -> Result<()>;

    /// Deliver completions of jobs in `group` to `listener`, replacing any
    /// earlier listener for that group.
    fn subscribe(
        &self,
        group: &str,
        listener: Arc<dyn CompletionListener>,
    ) -> Result<SubscriptionId>;

    /// Drop the registration `id` for `group`.
    ///
    /// A no-op when the group's listener has since been replaced by a newer
    /// `subscribe`; that registration stays in place.
    fn unsubscribe(&self, group: &str, id: SubscriptionId) -> Result<()>;
}
