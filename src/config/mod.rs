// src/config/mod.rs

//! Configuration loading and validation for tierflow.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate project-level invariants (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{
    ConfigFile, ConfigSection, DataSourceConfig, OrderField, RawConfigFile, StepConfig,
    TaskConfig,
};
