// src/task.rs

//! Immutable task and step records.
//!
//! These are what the configuration loader hands to the engine. They are
//! read-only once built and are shared between runs behind an `Arc`.

use std::collections::BTreeMap;

use crate::config::model::{StepConfig, TaskConfig};

/// Opaque, type-specific step parameters.
pub type Params = BTreeMap<String, toml::Value>;

/// One unit of work inside a task.
///
/// `order` and `step_type` keep the text from configuration; the job
/// descriptor builder turns them into a tier and a [`crate::types::StepType`]
/// and reports an invalid step if either does not parse.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub order: String,
    pub name: String,
    pub step_type: String,
    pub params: Params,
}

impl Step {
    pub fn new(
        order: impl Into<String>,
        name: impl Into<String>,
        step_type: impl Into<String>,
        params: Params,
    ) -> Self {
        Self {
            order: order.into(),
            name: name.into(),
            step_type: step_type.into(),
            params,
        }
    }

    pub fn from_config(cfg: &StepConfig) -> Self {
        Self {
            order: cfg.order.to_string(),
            name: cfg.step_name.clone(),
            step_type: cfg.step_type.clone(),
            params: cfg.params.clone(),
        }
    }
}

/// A named, cron-triggered collection of steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub cron: String,
    pub steps: Vec<Step>,
}

impl Task {
    pub fn from_config(cfg: &TaskConfig) -> Self {
        Self {
            id: cfg.task_id.clone(),
            name: cfg.task_name.clone(),
            cron: cfg.cron.clone(),
            steps: cfg.step.iter().map(Step::from_config).collect(),
        }
    }
}

/// Build task records for every task in a validated config, in file order.
pub fn tasks_from_config(cfg: &crate::config::ConfigFile) -> Vec<Task> {
    cfg.task.iter().map(Task::from_config).collect()
}
