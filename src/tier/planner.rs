// src/tier/planner.rs

//! Tier planner: orders a task's steps into a queue of job units.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, info};

use crate::errors::{Result, TierflowError};
use crate::task::Task;
use crate::tier::descriptor::{build_job_unit, JobUnit};

/// Job units of one task, sorted by tier ascending.
///
/// The "current tier" is the longest prefix whose units share the head's
/// tier value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierQueue {
    units: VecDeque<JobUnit>,
}

impl TierQueue {
    /// Build a queue from units that are already in tier order.
    pub fn from_sorted(units: Vec<JobUnit>) -> Self {
        debug_assert!(units.windows(2).all(|w| w[0].tier <= w[1].tier));
        Self {
            units: units.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Tier of the head unit, if any.
    pub fn head_tier(&self) -> Option<u32> {
        self.units.front().map(|u| u.tier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobUnit> {
        self.units.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.units.iter().map(|u| u.name.clone()).collect()
    }

    /// Distinct tier values in ascending order.
    pub fn tiers(&self) -> Vec<u32> {
        let mut tiers: Vec<u32> = self.units.iter().map(|u| u.tier).collect();
        tiers.dedup();
        tiers
    }

    /// Remove and return every leading unit that shares the head's tier.
    pub fn pop_head_tier(&mut self) -> Vec<JobUnit> {
        let Some(tier) = self.head_tier() else {
            return Vec::new();
        };

        let mut batch = Vec::new();
        while self.units.front().is_some_and(|u| u.tier == tier) {
            if let Some(unit) = self.units.pop_front() {
                batch.push(unit);
            }
        }
        batch
    }
}

/// Plan a task: build one job unit per step, ordered by tier.
///
/// The sort is stable, so steps sharing a tier keep their configured order
/// (that order is the submission order within the tier).
///
/// Errors:
/// - `EmptyTask` when the task has no steps; callers log it and schedule
///   nothing.
/// - `InvalidStep` for the first malformed step; no partial queue is
///   returned.
pub fn plan(task: &Task) -> Result<TierQueue> {
    if task.steps.is_empty() {
        return Err(TierflowError::EmptyTask(task.name.clone()));
    }

    let mut seen = HashSet::new();
    let mut units = Vec::with_capacity(task.steps.len());

    for step in task.steps.iter() {
        if !seen.insert(step.name.as_str()) {
            return Err(TierflowError::invalid_step(
                &task.name,
                &step.name,
                "step name is used more than once in this task",
            ));
        }
        units.push(build_job_unit(task, step)?);
    }

    // `sort_by_key` is stable.
    units.sort_by_key(|u| u.tier);

    let queue = TierQueue::from_sorted(units);

    info!(
        task = %task.name,
        steps = queue.len(),
        tiers = ?queue.tiers(),
        "planned task"
    );
    for unit in queue.iter() {
        debug!(task = %task.name, step = %unit.name, tier = unit.tier, "queued step");
    }

    Ok(queue)
}
