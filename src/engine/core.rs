// src/engine/core.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::errors::{Result, TierflowError};
use crate::scheduler::SchedulerAdapter;
use crate::task::Task;
use crate::tier::ExecutionTracker;

use super::{PlannedTask, RunOutcome, SkippedTask};

/// Owns the planned tasks and starts runs of them against one scheduler.
///
/// Each run gets its own [`ExecutionTracker`] built from a copy of the
/// task's planned queue. A task never has two runs in flight: starting a
/// task whose previous run has not finished is skipped.
pub struct Engine {
    planned: Vec<PlannedTask>,
    skipped: Vec<SkippedTask>,
    scheduler: Arc<dyn SchedulerAdapter>,
    next_run_id: AtomicU64,
    active: Mutex<HashMap<String, Arc<ExecutionTracker>>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("tasks", &self.task_names())
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        planned: Vec<PlannedTask>,
        skipped: Vec<SkippedTask>,
        scheduler: Arc<dyn SchedulerAdapter>,
    ) -> Self {
        info!(
            tasks = planned.len(),
            skipped = skipped.len(),
            "engine ready"
        );
        Self {
            planned,
            skipped,
            scheduler,
            next_run_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Plan `tasks` and build an engine over the ones that planned.
    pub fn from_tasks(tasks: &[Task], scheduler: Arc<dyn SchedulerAdapter>) -> Self {
        let (planned, skipped) = super::plan_all(tasks);
        Self::new(planned, skipped, scheduler)
    }

    pub fn planned(&self) -> &[PlannedTask] {
        &self.planned
    }

    pub fn skipped(&self) -> &[SkippedTask] {
        &self.skipped
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.planned.iter().map(|p| p.task.name.as_str()).collect()
    }

    pub fn planned_task(&self, name: &str) -> Option<&PlannedTask> {
        self.planned.iter().find(|p| p.task.name == name)
    }

    /// Tasks with a run that has not reached a terminal phase, sorted.
    pub fn active_runs(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock_active()
            .iter()
            .filter(|(_, t)| !t.phase().is_terminal())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Start a new run of `name`.
    ///
    /// Returns `Ok(None)` when the previous run of the task is still in
    /// flight. Scheduler rejections during start are returned as errors;
    /// the run is already terminal at that point.
    pub fn start_run(&self, name: &str) -> Result<Option<Arc<ExecutionTracker>>> {
        let planned = self
            .planned_task(name)
            .ok_or_else(|| TierflowError::TaskNotFound(name.to_string()))?;

        let tracker = {
            let mut active = self.lock_active();
            if let Some(previous) = active.get(name) {
                if !previous.phase().is_terminal() {
                    warn!(
                        task = %name,
                        run_id = previous.run_id(),
                        "previous run still active; skipping this trigger"
                    );
                    return Ok(None);
                }
            }

            let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
            let tracker = ExecutionTracker::new(
                name,
                run_id,
                planned.queue.clone(),
                Arc::clone(&self.scheduler),
            );
            active.insert(name.to_string(), Arc::clone(&tracker));
            tracker
        };

        debug!(task = %name, run_id = tracker.run_id(), "starting run");
        tracker.start()?;
        Ok(Some(tracker))
    }

    /// Start a run of `name` and wait for it to finish.
    pub async fn run_task(&self, name: &str) -> Result<RunOutcome> {
        let tracker = self.start_run(name)?.ok_or_else(|| {
            TierflowError::SchedulerRegistration(format!(
                "task '{name}' already has an active run"
            ))
        })?;

        let phase = tracker.wait_finished().await;
        Ok(RunOutcome {
            task: name.to_string(),
            run_id: tracker.run_id(),
            phase,
            statuses: tracker.statuses(),
        })
    }

    fn lock_active(&self) -> MutexGuard<'_, HashMap<String, Arc<ExecutionTracker>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
