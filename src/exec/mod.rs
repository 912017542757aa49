// src/exec/mod.rs

//! Job-type handlers.
//!
//! The scheduler resolves a unit's `type_tag` through a [`HandlerRegistry`]
//! and awaits the handler. The tier engine itself never calls into this
//! module.
//!
//! - [`process`] runs shell commands and drains their output into logs.
//! - [`query`] renders and runs warehouse queries.
//! - [`loader`] generates and runs data-loading statements.
//! - [`transfer`] copies files (with optional glob sources and hash
//!   verification).
//! - [`compute`] submits distributed compute applications.
//! - [`script`] runs scripts.
//! - [`function`] calls Rust closures registered by the embedding program.

pub mod compute;
pub mod function;
pub mod loader;
pub mod process;
pub mod query;
pub mod script;
pub mod transfer;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use crate::config::{ConfigFile, DataSourceConfig};
use crate::tier::JobUnit;
use crate::types::StepType;

pub use function::{FunctionRegistry, StepFunction};

/// Boxed future returned by [`JobHandler::run`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Executes one job type.
///
/// `Ok(())` is reported to the tracker as success, any error as failure.
pub trait JobHandler: Send + Sync {
    fn run<'a>(&'a self, unit: &'a JobUnit, ctx: &'a HandlerContext) -> HandlerFuture<'a>;
}

/// Settings shared by all handlers.
#[derive(Debug, Clone, Default)]
pub struct HandlerContext {
    /// Relative paths in step parameters are resolved against this.
    pub base_dir: PathBuf,
    pub query_command: String,
    pub compute_submit_command: String,
    pub verify_transfers: bool,
    pub datasources: Vec<DataSourceConfig>,
}

impl HandlerContext {
    pub fn from_config(cfg: &ConfigFile, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            query_command: cfg.config.query_command.clone(),
            compute_submit_command: cfg.config.compute_submit_command.clone(),
            verify_transfers: cfg.config.verify_transfers,
            datasources: cfg.datasource.clone(),
        }
    }

    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn datasource(&self, name: &str) -> Option<&DataSourceConfig> {
        self.datasources.iter().find(|ds| ds.name == name)
    }
}

/// Handlers keyed by step type.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<StepType, Arc<dyn JobHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("HandlerRegistry")
            .field("types", &types)
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a handler for every step type.
    pub fn builtin(functions: FunctionRegistry) -> Self {
        Self::new()
            .with(StepType::WarehouseQuery, Arc::new(query::WarehouseQueryHandler))
            .with(StepType::DataLoader, Arc::new(loader::DataLoaderHandler))
            .with(
                StepType::FilesystemTransfer,
                Arc::new(transfer::FilesystemTransferHandler),
            )
            .with(
                StepType::DistributedComputeJob,
                Arc::new(compute::DistributedComputeHandler),
            )
            .with(StepType::Script, Arc::new(script::ScriptHandler))
            .with(
                StepType::CustomFunction,
                Arc::new(function::CustomFunctionHandler::new(functions)),
            )
    }

    /// Builder-style [`HandlerRegistry::register`].
    pub fn with(mut self, step_type: StepType, handler: Arc<dyn JobHandler>) -> Self {
        self.register(step_type, handler);
        self
    }

    /// Install `handler` for `step_type`, returning the one it replaces.
    pub fn register(
        &mut self,
        step_type: StepType,
        handler: Arc<dyn JobHandler>,
    ) -> Option<Arc<dyn JobHandler>> {
        self.handlers.insert(step_type, handler)
    }

    pub fn get(&self, step_type: StepType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&step_type).cloned()
    }

    /// Step types with no handler installed.
    pub fn missing(&self) -> Vec<StepType> {
        StepType::ALL
            .iter()
            .copied()
            .filter(|t| !self.handlers.contains_key(t))
            .collect()
    }
}

/// Adapter turning a synchronous closure into a [`JobHandler`].
///
/// Handy for embedding programs and tests that do not need async IO.
pub struct FnHandler<F>(pub F);

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&JobUnit) -> anyhow::Result<()> + Send + Sync,
{
    fn run<'a>(&'a self, unit: &'a JobUnit, _ctx: &'a HandlerContext) -> HandlerFuture<'a> {
        let result = (self.0)(unit);
        Box::pin(async move { result })
    }
}
