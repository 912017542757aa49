// src/exec/query.rs

//! Warehouse query handler.
//!
//! The query file named by `path` is read, `${key}` placeholders are
//! replaced from the step's `query_param` table, and the rendered text is
//! handed to the configured `query_command` through a temp file.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use regex::Regex;
use tracing::debug;

use crate::exec::process::{run_shell, shell_quote};
use crate::exec::{HandlerContext, HandlerFuture, JobHandler};
use crate::tier::JobUnit;

const PLACEHOLDER: &str = r"\$\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}";

pub struct WarehouseQueryHandler;

impl JobHandler for WarehouseQueryHandler {
    fn run<'a>(&'a self, unit: &'a JobUnit, ctx: &'a HandlerContext) -> HandlerFuture<'a> {
        Box::pin(run_query(unit, ctx))
    }
}

async fn run_query(unit: &JobUnit, ctx: &HandlerContext) -> Result<()> {
    let path = ctx.resolve(unit.data.require_str("path")?);
    let template = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading query file {}", path.display()))?;

    // `hive_param` is accepted as an older spelling.
    let params = unit
        .data
        .get_table("query_param")
        .or_else(|| unit.data.get_table("hive_param"))
        .cloned()
        .unwrap_or_default();

    let query = render_query(&template, &params)?;
    debug!(job = %unit.key(), bytes = query.len(), "rendered query");

    run_statements(unit, ctx, &query, &[]).await
}

/// Replace every `${key}` in `template` with the matching entry of
/// `params`.
///
/// String values are inserted verbatim, other values in their TOML form.
/// Placeholders without a value are an error listing all of them.
pub fn render_query(template: &str, params: &toml::Table) -> Result<String> {
    let re = Regex::new(PLACEHOLDER)?;

    let mut missing: Vec<String> = Vec::new();
    let rendered = re.replace_all(template, |caps: &regex::Captures<'_>| {
        let key = &caps[1];
        match params.get(key) {
            Some(toml::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                if !missing.iter().any(|m| m == key) {
                    missing.push(key.to_string());
                }
                caps[0].to_string()
            }
        }
    });

    if !missing.is_empty() {
        bail!("no value for query parameter(s): {}", missing.join(", "));
    }
    Ok(rendered.into_owned())
}

/// Write `statements` to a temp file and run `query_command <file>`.
///
/// Shared with the data loader handler.
pub(crate) async fn run_statements(
    unit: &JobUnit,
    ctx: &HandlerContext,
    statements: &str,
    envs: &[(String, String)],
) -> Result<()> {
    let file = statement_file(unit);
    tokio::fs::write(&file, statements)
        .await
        .with_context(|| format!("writing query file {}", file.display()))?;

    let cmd = format!(
        "{} {}",
        ctx.query_command,
        shell_quote(&file.to_string_lossy())
    );
    let result = run_shell(&unit.key().to_string(), &cmd, envs, &ctx.base_dir).await;

    if let Err(err) = tokio::fs::remove_file(&file).await {
        debug!(file = %file.display(), error = %err, "could not remove query file");
    }
    result
}

fn statement_file(unit: &JobUnit) -> PathBuf {
    let clean = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    };
    std::env::temp_dir().join(format!(
        "tierflow-{}-{}-{}.sql",
        clean(&unit.group),
        clean(&unit.name),
        std::process::id()
    ))
}
