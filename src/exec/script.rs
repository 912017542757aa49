// src/exec/script.rs

use anyhow::Result;

use crate::exec::process::{run_shell, shell_quote};
use crate::exec::{HandlerContext, HandlerFuture, JobHandler};
use crate::tier::{JobData, JobUnit};

/// Runs `<path> [param]` through the shell.
pub struct ScriptHandler;

impl JobHandler for ScriptHandler {
    fn run<'a>(&'a self, unit: &'a JobUnit, ctx: &'a HandlerContext) -> HandlerFuture<'a> {
        Box::pin(async move {
            let cmd = build_script_command(&unit.data, ctx)?;
            run_shell(&unit.key().to_string(), &cmd, &[], &ctx.base_dir).await
        })
    }
}

/// A string `param` is appended as written (it may hold several shell
/// words); a list is appended one quoted word per entry.
pub fn build_script_command(data: &JobData, ctx: &HandlerContext) -> Result<String> {
    let path = data.require_str("path")?;
    let resolved = ctx.resolve(path);
    // Bare command names (no separator) are left for PATH lookup.
    let program = if path.contains('/') && resolved.exists() {
        shell_quote(&resolved.to_string_lossy())
    } else {
        path.to_string()
    };

    let cmd = match data.get("param") {
        Some(toml::Value::String(p)) if !p.trim().is_empty() => format!("{program} {p}"),
        Some(toml::Value::Array(_)) => {
            let args = data.get_str_list("param").unwrap_or_default();
            let quoted: Vec<String> = args.iter().map(|a| shell_quote(a)).collect();
            format!("{program} {}", quoted.join(" "))
        }
        _ => program,
    };
    Ok(cmd)
}
