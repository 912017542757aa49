// src/exec/function.rs

//! Custom function handler.
//!
//! Steps of type `custom_function` name an entry in a [`FunctionRegistry`]
//! filled by the embedding program. Functions run on Tokio's blocking pool
//! and receive the job's data bag.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::debug;

use crate::exec::{HandlerContext, HandlerFuture, JobHandler};
use crate::tier::{JobData, JobUnit};

pub type StepFunction = Arc<dyn Fn(&JobData) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, StepFunction>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&JobData) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn get(&self, name: &str) -> Option<StepFunction> {
        self.functions.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug)]
pub struct CustomFunctionHandler {
    functions: FunctionRegistry,
}

impl CustomFunctionHandler {
    pub fn new(functions: FunctionRegistry) -> Self {
        Self { functions }
    }
}

impl JobHandler for CustomFunctionHandler {
    fn run<'a>(&'a self, unit: &'a JobUnit, _ctx: &'a HandlerContext) -> HandlerFuture<'a> {
        Box::pin(async move {
            let name = unit.data.require_str("function")?;
            let f = self
                .functions
                .get(name)
                .ok_or_else(|| anyhow!("no function registered as '{name}'"))?;

            debug!(job = %unit.key(), function = %name, "calling custom function");
            let data = unit.data.clone();
            tokio::task::spawn_blocking(move || f(&data))
                .await
                .with_context(|| format!("custom function '{name}' panicked"))?
        })
    }
}
