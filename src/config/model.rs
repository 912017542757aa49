// src/config/model.rs

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// Configuration as deserialized from TOML, before validation.
///
/// ```toml
/// project_id = 7
/// project_name = "warehouse-nightly"
///
/// [config]
/// max_workers = 4
///
/// [[datasource]]
/// name = "warehouse"
/// url = "jdbc:hive2://localhost:10000/default"
///
/// [[task]]
/// task_id = "1"
/// task_name = "nightly"
/// cron = "0 0 2 * * ?"
///
/// [[task.step]]
/// order = "1"
/// step_name = "load"
/// type = "hive"
/// path = "sql/load.hql"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub project_id: Option<i64>,

    #[serde(default)]
    pub project_name: String,

    /// Engine and job-runner settings from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// `[[datasource]]` entries, referenced by name from data loader steps.
    #[serde(default)]
    pub datasource: Vec<DataSourceConfig>,

    /// `[[task]]` entries in file order.
    #[serde(default)]
    pub task: Vec<TaskConfig>,
}

/// A validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub project_id: Option<i64>,
    pub project_name: String,
    pub config: ConfigSection,
    pub datasource: Vec<DataSourceConfig>,
    pub task: Vec<TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            project_id: raw.project_id,
            project_name: raw.project_name,
            config: raw.config,
            datasource: raw.datasource,
            task: raw.task,
        }
    }

    pub fn datasource(&self, name: &str) -> Option<&DataSourceConfig> {
        self.datasource.iter().find(|ds| ds.name == name)
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Number of jobs the local scheduler runs at the same time.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Command used to run warehouse queries and data loads.
    ///
    /// The path of the rendered query file is appended as the last argument.
    #[serde(default = "default_query_command")]
    pub query_command: String,

    /// Command used to submit distributed compute applications.
    #[serde(default = "default_compute_submit_command")]
    pub compute_submit_command: String,

    /// Verify every filesystem transfer by comparing content hashes.
    #[serde(default)]
    pub verify_transfers: bool,

    /// Upper bound on a single job's runtime, enforced by the local scheduler.
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,
}

fn default_max_workers() -> usize {
    4
}

fn default_query_command() -> String {
    "hive -f".to_string()
}

fn default_compute_submit_command() -> String {
    "spark-submit".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            query_command: default_query_command(),
            compute_submit_command: default_compute_submit_command(),
            verify_transfers: false,
            job_timeout_secs: None,
        }
    }
}

/// `[[datasource]]` entry.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DataSourceConfig {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub driver: String,
}

/// `[[task]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub task_id: String,
    pub task_name: String,
    pub cron: String,

    /// `[[task.step]]` entries. May be empty; such a task is skipped with a
    /// warning at planning time.
    #[serde(default)]
    pub step: Vec<StepConfig>,
}

/// `[[task.step]]` entry.
///
/// Everything except `order`, `step_name` and `type` is collected into
/// `params` untouched; the descriptor builder decides which keys matter.
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    pub order: OrderField,
    pub step_name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, toml::Value>,
}

/// `order` may be written as `order = 1` or `order = "1"`.
///
/// It is kept as text here and parsed into a tier at planning time, so a
/// bad value only affects its own task.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OrderField {
    Number(i64),
    Text(String),
}

impl fmt::Display for OrderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderField::Number(n) => write!(f, "{n}"),
            OrderField::Text(s) => f.write_str(s),
        }
    }
}
