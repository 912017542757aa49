// src/exec/compute.rs

//! Distributed compute handler: submits an application through
//! `compute_submit_command`.

use anyhow::Result;

use crate::exec::process::{run_shell, shell_quote};
use crate::exec::{HandlerContext, HandlerFuture, JobHandler};
use crate::tier::{JobData, JobUnit};

pub struct DistributedComputeHandler;

impl JobHandler for DistributedComputeHandler {
    fn run<'a>(&'a self, unit: &'a JobUnit, ctx: &'a HandlerContext) -> HandlerFuture<'a> {
        Box::pin(async move {
            let cmd = build_submit_command(&unit.data, ctx)?;
            run_shell(&unit.key().to_string(), &cmd, &[], &ctx.base_dir).await
        })
    }
}

/// `<submit> [--master M] [--deploy-mode D] --class C <path> [param...]`
pub fn build_submit_command(data: &JobData, ctx: &HandlerContext) -> Result<String> {
    let mut parts = vec![ctx.compute_submit_command.clone()];

    if let Some(master) = data.get_str("master") {
        parts.push("--master".to_string());
        parts.push(shell_quote(master));
    }
    if let Some(mode) = data.get_str("deploy_mode") {
        parts.push("--deploy-mode".to_string());
        parts.push(shell_quote(mode));
    }

    parts.push("--class".to_string());
    parts.push(shell_quote(data.require_str("class_name")?));

    let app = ctx.resolve(data.require_str("path")?);
    parts.push(shell_quote(&app.to_string_lossy()));

    if let Some(args) = data.get_str_list("param") {
        parts.extend(args.iter().map(|a| shell_quote(a)));
    }

    Ok(parts.join(" "))
}
