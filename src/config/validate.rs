// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TierflowError};
use crate::scheduler::cron::CronSchedule;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TierflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_datasources(cfg)?;
    validate_tasks(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(TierflowError::ConfigError(
            "config must contain at least one [[task]] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_workers == 0 {
        return Err(TierflowError::ConfigError(
            "[config].max_workers must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.config.query_command.trim().is_empty() {
        return Err(TierflowError::ConfigError(
            "[config].query_command must not be empty".to_string(),
        ));
    }

    if cfg.config.job_timeout_secs == Some(0) {
        return Err(TierflowError::ConfigError(
            "[config].job_timeout_secs must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_datasources(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for ds in cfg.datasource.iter() {
        if ds.name.trim().is_empty() {
            return Err(TierflowError::ConfigError(
                "every [[datasource]] needs a non-empty `name`".to_string(),
            ));
        }
        if !seen.insert(ds.name.as_str()) {
            return Err(TierflowError::ConfigError(format!(
                "datasource '{}' is defined more than once",
                ds.name
            )));
        }
    }
    Ok(())
}

/// Task names double as the scheduler group, so they must be unique.
fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    let mut names = HashSet::new();
    let mut ids = HashSet::new();

    for task in cfg.task.iter() {
        if task.task_name.trim().is_empty() {
            return Err(TierflowError::ConfigError(format!(
                "task with id '{}' has an empty `task_name`",
                task.task_id
            )));
        }
        if !names.insert(task.task_name.as_str()) {
            return Err(TierflowError::ConfigError(format!(
                "task name '{}' is used by more than one task",
                task.task_name
            )));
        }
        if !ids.insert(task.task_id.as_str()) {
            return Err(TierflowError::ConfigError(format!(
                "task id '{}' is used by more than one task",
                task.task_id
            )));
        }

        task.cron.parse::<CronSchedule>()?;
    }

    Ok(())
}
