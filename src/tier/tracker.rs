// src/tier/tracker.rs

//! Execution tracker: the concurrency-safe shell around [`TrackerState`].
//!
//! One tracker exists per task run. It registers itself with the scheduler
//! as the completion listener for the task's group, submits the first tier,
//! and from then on reacts to completion notifications, which may arrive on
//! any thread and in any order. A single mutex guards the queue, the status
//! map and the running set. Units are submitted after the lock is released,
//! so a scheduler that reports completion synchronously from `trigger`
//! cannot deadlock the tracker.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, TierflowError};
use crate::scheduler::{CompletionListener, SchedulerAdapter, SubscriptionId};
use crate::tier::descriptor::JobUnit;
use crate::tier::planner::TierQueue;
use crate::tier::state::TrackerState;
use crate::tier::status::{ExecutionStatus, RunPhase};

pub struct ExecutionTracker {
    task: String,
    run_id: u64,
    state: Mutex<TrackerState>,
    scheduler: Arc<dyn SchedulerAdapter>,
    /// Set once the listener registration succeeds.
    subscription: OnceLock<SubscriptionId>,
    phase_tx: watch::Sender<RunPhase>,
}

impl fmt::Debug for ExecutionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionTracker")
            .field("task", &self.task)
            .field("run_id", &self.run_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ExecutionTracker {
    pub fn new(
        task: impl Into<String>,
        run_id: u64,
        queue: TierQueue,
        scheduler: Arc<dyn SchedulerAdapter>,
    ) -> Arc<Self> {
        let task = task.into();
        let (phase_tx, _) = watch::channel(RunPhase::NotStarted);
        Arc::new(Self {
            state: Mutex::new(TrackerState::new(task.clone(), queue)),
            task,
            run_id,
            scheduler,
            subscription: OnceLock::new(),
            phase_tx,
        })
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Register as the group's completion listener and submit the head tier.
    ///
    /// An empty queue finishes the run immediately with [`RunPhase::Empty`]
    /// and submits nothing. Scheduler rejections are returned as
    /// `SchedulerRegistration` after the run has been moved to a terminal
    /// phase. Step failures never surface here; they arrive later through
    /// [`CompletionListener::on_completion`].
    pub fn start(self: &Arc<Self>) -> Result<RunPhase> {
        {
            let mut state = self.lock();
            if *state.phase() != RunPhase::NotStarted {
                warn!(task = %self.task, run_id = self.run_id, "start called twice; ignoring");
                return Ok(state.phase().clone());
            }
            if state.remaining() == 0 {
                warn!(
                    task = %self.task,
                    run_id = self.run_id,
                    "{}",
                    TierflowError::EmptyTask(self.task.clone())
                );
                state.begin();
                self.publish(&state);
                return Ok(state.phase().clone());
            }
        }

        let listener: Arc<dyn CompletionListener> = Arc::clone(self) as Arc<dyn CompletionListener>;
        match self.scheduler.subscribe(&self.task, listener) {
            Ok(id) => {
                let _ = self.subscription.set(id);
            }
            Err(err) => {
                error!(
                    task = %self.task,
                    run_id = self.run_id,
                    error = %err,
                    "scheduler rejected completion listener; aborting run"
                );
                let mut state = self.lock();
                state.abort(err.to_string());
                self.publish(&state);
                return Err(err);
            }
        }

        let released = {
            let mut state = self.lock();
            let step = state.begin();
            self.publish(&state);
            step.released
        };

        info!(
            task = %self.task,
            run_id = self.run_id,
            steps = released.len(),
            "task run started"
        );

        self.dispatch(released)?;
        Ok(self.phase())
    }

    pub fn phase(&self) -> RunPhase {
        self.lock().phase().clone()
    }

    pub fn status_of(&self, step: &str) -> Option<ExecutionStatus> {
        self.lock().status_of(step)
    }

    pub fn statuses(&self) -> BTreeMap<String, ExecutionStatus> {
        self.lock().statuses()
    }

    /// Names of steps currently in flight, sorted.
    pub fn running(&self) -> Vec<String> {
        self.lock().running()
    }

    /// Watch the run phase; the receiver sees every terminal transition.
    pub fn watch_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase_tx.subscribe()
    }

    /// Resolve once the run reaches a terminal phase.
    pub async fn wait_finished(&self) -> RunPhase {
        let mut rx = self.phase_tx.subscribe();
        match rx.wait_for(RunPhase::is_terminal).await {
            Ok(phase) => phase.clone(),
            Err(_) => self.phase(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish the current phase; called with the lock held so watchers see
    /// transitions in order.
    fn publish(&self, state: &TrackerState) {
        self.phase_tx.send_replace(state.phase().clone());
    }

    /// Submit and trigger each unit of a released tier, in order.
    ///
    /// On the first rejection the rest of the batch is not submitted and the
    /// run is halted.
    fn dispatch(&self, units: Vec<JobUnit>) -> Result<()> {
        let names: Vec<String> = units.iter().map(|u| u.name.clone()).collect();

        for (idx, unit) in units.into_iter().enumerate() {
            let name = unit.name.clone();
            let tier = unit.tier;

            let submitted = self
                .scheduler
                .submit(unit)
                .and_then(|handle| self.scheduler.trigger(&handle));

            match submitted {
                Ok(()) => {
                    debug!(task = %self.task, run_id = self.run_id, step = %name, tier, "step submitted");
                }
                Err(err) => {
                    error!(
                        task = %self.task,
                        run_id = self.run_id,
                        step = %name,
                        tier,
                        error = %err,
                        "scheduler rejected step; aborting run"
                    );
                    let finished = {
                        let mut state = self.lock();
                        let step = state.abort_submission(&name, &names[idx + 1..]);
                        self.publish(&state);
                        step.run_just_finished
                    };
                    if finished {
                        self.finish();
                    }
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Drop this run's listener registration once the run is terminal.
    ///
    /// Watchers already see the terminal phase, so a next run of the task
    /// may have registered in the meantime; the scheduler only removes the
    /// registration when it is still ours.
    fn finish(&self) {
        let phase = self.phase();
        match &phase {
            RunPhase::Completed => {
                info!(task = %self.task, run_id = self.run_id, "task run completed");
            }
            other => {
                warn!(task = %self.task, run_id = self.run_id, phase = ?other, "task run ended without completing");
            }
        }

        let Some(id) = self.subscription.get().copied() else {
            return;
        };
        if let Err(err) = self.scheduler.unsubscribe(&self.task, id) {
            warn!(
                task = %self.task,
                run_id = self.run_id,
                error = %err,
                "failed to unregister completion listener"
            );
        }
    }
}

impl CompletionListener for ExecutionTracker {
    fn on_completion(&self, step: &str, success: bool) {
        let transition = {
            let mut state = self.lock();
            let transition = state.complete(step, success);
            self.publish(&state);
            transition
        };

        if !transition.released.is_empty() {
            // Failures are logged and recorded by `dispatch`; nobody awaits
            // this notification.
            let _ = self.dispatch(transition.released);
        }

        if transition.run_just_finished {
            self.finish();
        }
    }
}
