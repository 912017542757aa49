#![allow(dead_code)]

use tierflow::config::{
    ConfigFile, ConfigSection, DataSourceConfig, OrderField, RawConfigFile, StepConfig,
    TaskConfig,
};
use tierflow::task::{Params, Step, Task};
use tierflow::tier::{plan, TierQueue};

/// Builder for `Task` records.
///
/// Steps default to type `script` with `path = "true"`, so a task built
/// only from `(order, name)` pairs always plans.
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            task: Task {
                id: "1".to_string(),
                name: name.to_string(),
                cron: "0 0 2 * * ?".to_string(),
                steps: vec![],
            },
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn cron(mut self, cron: &str) -> Self {
        self.task.cron = cron.to_string();
        self
    }

    /// Add a default script step.
    pub fn step(self, order: u32, name: &str) -> Self {
        self.with_step(StepBuilder::new(name).order(order).build())
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.task.steps.push(step);
        self
    }

    pub fn build(self) -> Task {
        self.task
    }

    /// Build and plan; panics if the task does not plan.
    pub fn plan(self) -> TierQueue {
        plan(&self.task).expect("task built by TaskBuilder should plan")
    }
}

/// Builder for `Step` records.
pub struct StepBuilder {
    order: String,
    name: String,
    step_type: String,
    params: Params,
}

impl StepBuilder {
    pub fn new(name: &str) -> Self {
        let mut params = Params::new();
        params.insert("path".to_string(), toml::Value::String("true".to_string()));
        Self {
            order: "1".to_string(),
            name: name.to_string(),
            step_type: "script".to_string(),
            params,
        }
    }

    pub fn order(mut self, order: u32) -> Self {
        self.order = order.to_string();
        self
    }

    /// Raw order text, for exercising order parsing.
    pub fn raw_order(mut self, order: &str) -> Self {
        self.order = order.to_string();
        self
    }

    /// Change the type and drop the default params.
    pub fn step_type(mut self, step_type: &str) -> Self {
        self.step_type = step_type.to_string();
        self.params.clear();
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> Step {
        Step::new(self.order, self.name, self.step_type, self.params)
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                project_id: None,
                project_name: "test".to_string(),
                config: ConfigSection::default(),
                datasource: vec![],
                task: vec![],
            },
        }
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.config.max_workers = n;
        self
    }

    pub fn with_datasource(mut self, name: &str, url: &str) -> Self {
        self.config.datasource.push(DataSourceConfig {
            name: name.to_string(),
            url: url.to_string(),
            ..DataSourceConfig::default()
        });
        self
    }

    /// Add a task from a record, converting its steps back to config form.
    pub fn with_task(mut self, task: &Task) -> Self {
        self.config.task.push(TaskConfig {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            cron: task.cron.clone(),
            step: task
                .steps
                .iter()
                .map(|s| StepConfig {
                    order: OrderField::Text(s.order.clone()),
                    step_name: s.name.clone(),
                    step_type: s.step_type.clone(),
                    params: s.params.clone(),
                })
                .collect(),
        });
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
