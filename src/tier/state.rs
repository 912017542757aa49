// src/tier/state.rs

//! Pure per-run state machine behind the execution tracker.
//!
//! `TrackerState` owns the remaining queue, the per-step status map and the
//! running set. It performs no IO and holds no lock; the tracker wraps it in
//! a mutex and submits whatever a transition releases.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, error, info, warn};

use crate::tier::descriptor::JobUnit;
use crate::tier::planner::TierQueue;
use crate::tier::status::{ExecutionStatus, RunPhase};
use crate::tier::tracker_step::TrackerStep;

#[derive(Debug)]
pub struct TrackerState {
    task: String,
    queue: TierQueue,
    status: HashMap<String, ExecutionStatus>,
    tiers: HashMap<String, u32>,
    running: HashSet<String>,
    /// Steps of the in-flight tier that reported failure.
    tier_failures: Vec<String>,
    phase: RunPhase,
}

impl TrackerState {
    /// Every step in `queue` starts as `New`.
    pub fn new(task: impl Into<String>, queue: TierQueue) -> Self {
        let status = queue
            .iter()
            .map(|u| (u.name.clone(), ExecutionStatus::New))
            .collect();
        let tiers = queue.iter().map(|u| (u.name.clone(), u.tier)).collect();

        Self {
            task: task.into(),
            queue,
            status,
            tiers,
            running: HashSet::new(),
            tier_failures: Vec::new(),
            phase: RunPhase::NotStarted,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn phase(&self) -> &RunPhase {
        &self.phase
    }

    pub fn status_of(&self, step: &str) -> Option<ExecutionStatus> {
        self.status.get(step).copied()
    }

    /// Snapshot of every step's status, ordered by name.
    pub fn statuses(&self) -> BTreeMap<String, ExecutionStatus> {
        self.status
            .iter()
            .map(|(name, st)| (name.clone(), *st))
            .collect()
    }

    /// Names currently `Processing`, sorted.
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.running.iter().cloned().collect();
        names.sort();
        names
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Units not yet released.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Start the run: release the head tier, or finish immediately when the
    /// queue is empty.
    pub fn begin(&mut self) -> TrackerStep {
        if self.phase != RunPhase::NotStarted {
            warn!(task = %self.task, phase = ?self.phase, "run already started; ignoring");
            return TrackerStep::default();
        }

        if self.queue.is_empty() {
            warn!(task = %self.task, "task has no steps; nothing to submit");
            self.phase = RunPhase::Empty;
            return TrackerStep {
                run_just_finished: true,
                ..TrackerStep::default()
            };
        }

        TrackerStep {
            released: self.release_head_tier(),
            ..TrackerStep::default()
        }
    }

    /// Record a completion notification for `step`.
    ///
    /// Notifications for unknown steps, or for steps that are not
    /// `Processing` (duplicates, stale deliveries), are ignored so every
    /// step reaches exactly one terminal state.
    pub fn complete(&mut self, step: &str, success: bool) -> TrackerStep {
        match self.status.get(step) {
            Some(ExecutionStatus::Processing) => {}
            Some(other) => {
                warn!(
                    task = %self.task,
                    step = %step,
                    status = %other,
                    success,
                    "completion for step that is not processing; ignoring"
                );
                return TrackerStep::default();
            }
            None => {
                warn!(task = %self.task, step = %step, "completion for unknown step; ignoring");
                return TrackerStep::default();
            }
        }

        let tier = self.tier_of(step);
        let mut newly_failed = Vec::new();

        self.running.remove(step);
        if success {
            self.status
                .insert(step.to_string(), ExecutionStatus::Completed);
            info!(
                task = %self.task,
                step = %step,
                tier,
                still_running = self.running.len(),
                "step completed"
            );
        } else {
            self.status.insert(step.to_string(), ExecutionStatus::Failed);
            self.tier_failures.push(step.to_string());
            newly_failed.push(step.to_string());
            error!(
                task = %self.task,
                step = %step,
                tier,
                still_running = self.running.len(),
                "step failed"
            );
        }

        let mut result = if self.running.is_empty() {
            self.finish_tier(tier)
        } else {
            TrackerStep::default()
        };
        result.newly_failed = newly_failed;
        result
    }

    /// The scheduler rejected `failed` while its tier was being submitted.
    ///
    /// `failed` becomes `Failed`; `unsubmitted` (the rest of that tier, never
    /// handed to the scheduler) go back to `New`. The run halts once the
    /// already-submitted steps of the tier report in.
    pub fn abort_submission(&mut self, failed: &str, unsubmitted: &[String]) -> TrackerStep {
        let tier = self.tier_of(failed);

        let mut newly_failed = Vec::new();
        if self.running.remove(failed) {
            self.status.insert(failed.to_string(), ExecutionStatus::Failed);
            self.tier_failures.push(failed.to_string());
            newly_failed.push(failed.to_string());
        }

        for name in unsubmitted {
            if self.running.remove(name) {
                self.status.insert(name.clone(), ExecutionStatus::New);
                debug!(task = %self.task, step = %name, "step returned to New after submission abort");
            }
        }

        let mut result = if self.running.is_empty() {
            self.finish_tier(tier)
        } else {
            TrackerStep::default()
        };
        result.newly_failed = newly_failed;
        result
    }

    /// The scheduler refused the run before anything was submitted.
    pub fn abort(&mut self, reason: impl Into<String>) -> TrackerStep {
        if self.phase.is_terminal() {
            return TrackerStep::default();
        }
        self.phase = RunPhase::Aborted {
            reason: reason.into(),
        };
        TrackerStep {
            run_just_finished: true,
            ..TrackerStep::default()
        }
    }

    /// Called when the running set drains for `tier`.
    fn finish_tier(&mut self, tier: u32) -> TrackerStep {
        if !self.tier_failures.is_empty() {
            let failed = std::mem::take(&mut self.tier_failures);
            error!(
                task = %self.task,
                tier,
                failed = ?failed,
                blocked_steps = self.queue.len(),
                "tier finished with failures; halting run"
            );
            self.phase = RunPhase::Halted { tier, failed };
            return TrackerStep {
                run_just_finished: true,
                ..TrackerStep::default()
            };
        }

        if self.queue.is_empty() {
            info!(task = %self.task, "all tiers completed; run finished");
            self.phase = RunPhase::Completed;
            return TrackerStep {
                run_just_finished: true,
                ..TrackerStep::default()
            };
        }

        debug!(task = %self.task, tier, "tier completed; releasing next tier");
        TrackerStep {
            released: self.release_head_tier(),
            ..TrackerStep::default()
        }
    }

    /// Pop the head tier and mark its steps `Processing`.
    fn release_head_tier(&mut self) -> Vec<JobUnit> {
        let batch = self.queue.pop_head_tier();
        let Some(tier) = batch.first().map(|u| u.tier) else {
            return batch;
        };

        for unit in batch.iter() {
            self.status
                .insert(unit.name.clone(), ExecutionStatus::Processing);
            self.running.insert(unit.name.clone());
        }

        info!(
            task = %self.task,
            tier,
            steps = ?batch.iter().map(|u| u.name.as_str()).collect::<Vec<_>>(),
            remaining = self.queue.len(),
            "releasing tier"
        );

        self.phase = RunPhase::Running { tier };
        batch
    }

    fn tier_of(&self, step: &str) -> u32 {
        self.tiers.get(step).copied().unwrap_or_default()
    }
}
