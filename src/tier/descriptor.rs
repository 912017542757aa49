// src/tier/descriptor.rs

//! Job descriptor builder: turns a step record into a schedulable [`JobUnit`].

use std::collections::BTreeMap;

use anyhow::anyhow;
use tracing::debug;

use crate::errors::{Result, TierflowError};
use crate::scheduler::JobKey;
use crate::task::{Step, Task};
use crate::types::{StepType, TransferMode};

/// Keys the builder adds to every job's data bag.
///
/// Step parameters may not use these names.
pub const CONTEXT_KEYS: [&str; 5] = ["task_id", "task_name", "cron", "step_name", "order"];

/// Parameter bag carried by a [`JobUnit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobData(BTreeMap<String, toml::Value>);

impl JobData {
    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    /// Like [`JobData::get_str`] but with an error naming the missing key,
    /// for use inside job handlers.
    pub fn require_str(&self, key: &str) -> anyhow::Result<&str> {
        self.get_str(key)
            .ok_or_else(|| anyhow!("job parameter '{key}' is missing or not a string"))
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(|v| v.as_bool())
    }

    /// A list of strings; a single string is treated as a one-element list.
    pub fn get_str_list(&self, key: &str) -> Option<Vec<String>> {
        match self.0.get(key)? {
            toml::Value::String(s) => Some(vec![s.clone()]),
            toml::Value::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }

    pub fn get_table(&self, key: &str) -> Option<&toml::Table> {
        self.0.get(key).and_then(|v| v.as_table())
    }

    fn insert(&mut self, key: &str, value: toml::Value) {
        self.0.insert(key.to_string(), value);
    }
}

impl FromIterator<(String, toml::Value)> for JobData {
    fn from_iter<I: IntoIterator<Item = (String, toml::Value)>>(iter: I) -> Self {
        JobData(iter.into_iter().collect())
    }
}

/// Opaque, schedulable representation of one step.
///
/// Submitted to the scheduler by value; the engine keeps no handle into the
/// scheduler's copy.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUnit {
    /// Scheduler group: the owning task's name.
    pub group: String,
    /// Step name, unique within the group.
    pub name: String,
    pub tier: u32,
    pub type_tag: StepType,
    pub data: JobData,
}

impl JobUnit {
    pub fn key(&self) -> JobKey {
        JobKey::new(&self.group, &self.name)
    }
}

/// Build the job unit for `step` of `task`.
///
/// Pure: fails with `InvalidStep` when the step's order is not an integer
/// `>= 1`, its type is unknown, a parameter collides with a context key, or
/// a parameter required by its type is absent. Handler-specific semantics
/// beyond presence are left to the handler.
pub fn build_job_unit(task: &Task, step: &Step) -> Result<JobUnit> {
    let invalid = |reason: String| TierflowError::invalid_step(&task.name, &step.name, reason);

    if step.name.trim().is_empty() {
        return Err(invalid("step name is empty".to_string()));
    }

    let tier = parse_tier(&step.order).map_err(&invalid)?;
    let type_tag: StepType = step.step_type.parse().map_err(&invalid)?;

    if let Some(key) = CONTEXT_KEYS.iter().find(|k| step.params.contains_key(**k)) {
        return Err(invalid(format!("parameter '{key}' is reserved")));
    }

    for key in type_tag.required_params() {
        if !is_present(step.params.get(*key)) {
            return Err(invalid(format!(
                "{type_tag} step requires parameter '{key}'"
            )));
        }
    }

    let mut data: JobData = step
        .params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    match type_tag {
        StepType::FilesystemTransfer => {
            let raw = data.get_str("mode").unwrap_or_default();
            let mode: TransferMode = raw.parse().map_err(&invalid)?;
            data.insert("mode", toml::Value::String(mode.as_str().to_string()));
        }
        StepType::DataLoader => {
            let has_source = ["source_csv", "source_tables"]
                .iter()
                .any(|k| is_present(step.params.get(*k)));
            if !has_source {
                return Err(invalid(
                    "data_loader step requires 'source_csv' or 'source_tables'".to_string(),
                ));
            }
        }
        _ => {}
    }

    data.insert("task_id", toml::Value::String(task.id.clone()));
    data.insert("task_name", toml::Value::String(task.name.clone()));
    data.insert("cron", toml::Value::String(task.cron.clone()));
    data.insert("step_name", toml::Value::String(step.name.clone()));
    data.insert("order", toml::Value::Integer(i64::from(tier)));

    debug!(
        task = %task.name,
        step = %step.name,
        tier,
        step_type = %type_tag,
        "built job unit"
    );

    Ok(JobUnit {
        group: task.name.clone(),
        name: step.name.clone(),
        tier,
        type_tag,
        data,
    })
}

/// Parse a step's string-encoded order into a tier (`>= 1`).
pub fn parse_tier(order: &str) -> std::result::Result<u32, String> {
    let value: i64 = order
        .trim()
        .parse()
        .map_err(|_| format!("order '{order}' is not an integer"))?;

    if value < 1 {
        return Err(format!("order must be >= 1 (got {value})"));
    }

    u32::try_from(value).map_err(|_| format!("order {value} is out of range"))
}

/// Blank strings and empty lists count as absent.
fn is_present(value: Option<&toml::Value>) -> bool {
    match value {
        None => false,
        Some(toml::Value::String(s)) => !s.trim().is_empty(),
        Some(toml::Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}
