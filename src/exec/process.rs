// src/exec/process.rs

//! Shell process runner shared by the command-based handlers.

use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Run `cmd` through the platform shell in `cwd` and wait for it.
///
/// Stdout and stderr are drained line by line into `debug!` logs so pipes
/// never fill. A non-zero exit is an error. The child is killed if the
/// returned future is dropped (timeouts, aborted workers).
pub async fn run_shell(label: &str, cmd: &str, envs: &[(String, String)], cwd: &Path) -> Result<()> {
    info!(job = %label, cmd = %cmd, "starting job process");

    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    if cwd.is_dir() {
        command.current_dir(cwd);
    }
    command
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning process for job '{label}'"))?;

    if let Some(stdout) = child.stdout.take() {
        let label = label.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(job = %label, "stdout: {}", line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let label = label.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(job = %label, "stderr: {}", line);
            }
        });
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of job '{label}'"))?;

    let code = status.code().unwrap_or(-1);
    info!(job = %label, exit_code = code, success = status.success(), "job process exited");

    if !status.success() {
        bail!("job '{label}' exited with code {code}");
    }
    Ok(())
}

/// Quote `s` as a single POSIX shell word.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
