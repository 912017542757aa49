// tests/config_loading.rs

mod common;
use crate::common::{ConfigFileBuilder, TaskBuilder};

use std::io::Write;

use tempfile::NamedTempFile;

use tierflow::config::{load_and_validate, load_from_str, ConfigFile, OrderField};
use tierflow::errors::TierflowError;
use tierflow::task::tasks_from_config;
use tierflow::tier::plan;
use tierflow::types::StepType;

const FULL_CONFIG: &str = r#"
project_id = 7
project_name = "warehouse-nightly"

[config]
max_workers = 8
query_command = "beeline -f"
job_timeout_secs = 600

[[datasource]]
name = "warehouse"
url = "jdbc:hive2://localhost:10000/default"
user_name = "etl"
password = "secret"

[[task]]
task_id = "1"
task_name = "nightly"
cron = "0 0 2 * * ?"

[[task.step]]
order = "2"
step_name = "aggregate"
type = "hive"
path = "sql/aggregate.hql"
query_param = { day = "2024-01-01", limit = 10 }

[[task.step]]
order = 1
step_name = "stage"
type = "filesystem_transfer"
mode = "copyIn"
source = "landing/*.csv"
destination = "staging/"

[[task]]
task_id = "2"
task_name = "hourly"
cron = "0 * * * *"
"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn test_full_config_loads_with_defaults_and_params() {
    let file = write_config(FULL_CONFIG);
    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.project_id, Some(7));
    assert_eq!(cfg.project_name, "warehouse-nightly");
    assert_eq!(cfg.config.max_workers, 8);
    assert_eq!(cfg.config.query_command, "beeline -f");
    assert_eq!(cfg.config.compute_submit_command, "spark-submit");
    assert!(!cfg.config.verify_transfers);
    assert_eq!(cfg.config.job_timeout_secs, Some(600));

    let ds = cfg.datasource("warehouse").unwrap();
    assert_eq!(ds.user_name, "etl");
    assert_eq!(ds.driver, "");

    assert_eq!(cfg.task.len(), 2);
    let nightly = &cfg.task[0];
    assert_eq!(nightly.step[0].order, OrderField::Text("2".to_string()));
    assert_eq!(nightly.step[1].order, OrderField::Number(1));
    assert_eq!(
        nightly.step[0].params.get("path").and_then(|v| v.as_str()),
        Some("sql/aggregate.hql")
    );
    assert!(nightly.step[0].params.contains_key("query_param"));
    assert!(cfg.task[1].step.is_empty());
}

#[test]
fn test_loaded_tasks_plan_into_tiers() {
    let cfg = ConfigFile::try_from(load_from_str(FULL_CONFIG).unwrap()).unwrap();
    let tasks = tasks_from_config(&cfg);

    let queue = plan(&tasks[0]).unwrap();
    assert_eq!(queue.names(), vec!["stage", "aggregate"]);

    let kinds: Vec<StepType> = queue.iter().map(|u| u.type_tag).collect();
    assert_eq!(kinds, vec![StepType::FilesystemTransfer, StepType::WarehouseQuery]);

    // The step-less task is loaded; planning reports it.
    assert!(matches!(plan(&tasks[1]), Err(TierflowError::EmptyTask(_))));
}

#[test]
fn test_malformed_step_does_not_fail_loading() {
    let raw = r#"
[[task]]
task_id = "1"
task_name = "broken"
cron = "0 0 2 * * ?"

[[task.step]]
order = "first"
step_name = "x"
type = "teleport"
"#;
    let cfg = ConfigFile::try_from(load_from_str(raw).unwrap()).unwrap();
    let tasks = tasks_from_config(&cfg);
    assert!(matches!(plan(&tasks[0]), Err(TierflowError::InvalidStep { .. })));
}

#[test]
fn test_config_without_tasks_is_rejected() {
    let file = write_config("project_name = \"empty\"\n");

    match load_and_validate(file.path()) {
        Err(TierflowError::ConfigError(msg)) => assert!(msg.contains("at least one")),
        other => panic!("expected ConfigError, got {:?}", other),
    }
}

#[test]
fn test_duplicate_task_names_are_rejected() {
    let task = TaskBuilder::new("dup").step(1, "a").build();
    let other = TaskBuilder::new("dup").id("2").step(1, "a").build();
    let raw = ConfigFileBuilder::new().with_task(&task).with_task(&other).raw();

    match ConfigFile::try_from(raw) {
        Err(TierflowError::ConfigError(msg)) => {
            assert!(msg.contains("task name 'dup'"), "msg: {msg}")
        }
        other => panic!("expected ConfigError, got {:?}", other),
    }
}

#[test]
fn test_duplicate_task_ids_are_rejected() {
    let a = TaskBuilder::new("a").id("9").build();
    let b = TaskBuilder::new("b").id("9").build();
    let raw = ConfigFileBuilder::new().with_task(&a).with_task(&b).raw();

    match ConfigFile::try_from(raw) {
        Err(TierflowError::ConfigError(msg)) => assert!(msg.contains("task id '9'"), "msg: {msg}"),
        other => panic!("expected ConfigError, got {:?}", other),
    }
}

#[test]
fn test_duplicate_datasources_are_rejected() {
    let task = TaskBuilder::new("t").step(1, "a").build();
    let raw = ConfigFileBuilder::new()
        .with_task(&task)
        .with_datasource("warehouse", "jdbc:a")
        .with_datasource("warehouse", "jdbc:b")
        .raw();

    match ConfigFile::try_from(raw) {
        Err(TierflowError::ConfigError(msg)) => assert!(msg.contains("'warehouse'")),
        other => panic!("expected ConfigError, got {:?}", other),
    }
}

#[test]
fn test_zero_workers_is_rejected() {
    let task = TaskBuilder::new("t").step(1, "a").build();
    let raw = ConfigFileBuilder::new().with_task(&task).max_workers(0).raw();

    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(TierflowError::ConfigError(_))
    ));
}

#[test]
fn test_bad_cron_is_rejected_at_load() {
    let task = TaskBuilder::new("t").cron("every day at two").step(1, "a").build();
    let raw = ConfigFileBuilder::new().with_task(&task).raw();

    match ConfigFile::try_from(raw) {
        Err(TierflowError::InvalidCron { expr, .. }) => assert_eq!(expr, "every day at two"),
        other => panic!("expected InvalidCron, got {:?}", other),
    }
}

#[test]
fn test_toml_syntax_error_is_reported() {
    assert!(matches!(
        load_from_str("[[task]\n"),
        Err(TierflowError::TomlError(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    assert!(matches!(
        load_and_validate(&missing),
        Err(TierflowError::IoError(_))
    ));
}
