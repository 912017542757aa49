// src/exec/transfer.rs

//! Filesystem transfer handler.
//!
//! `source` is a file or a glob (`landing/*.csv`); relative paths are
//! resolved against the handler base directory. With more than one
//! source, or a glob, `destination` is treated as a directory. When
//! verification is on, every copy is checked by comparing BLAKE3 hashes.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use blake3::Hasher;
use globset::GlobBuilder;
use tracing::{debug, info};

use crate::exec::{HandlerContext, HandlerFuture, JobHandler};
use crate::tier::JobUnit;
use crate::types::TransferMode;

pub struct FilesystemTransferHandler;

impl JobHandler for FilesystemTransferHandler {
    fn run<'a>(&'a self, unit: &'a JobUnit, ctx: &'a HandlerContext) -> HandlerFuture<'a> {
        Box::pin(async move {
            let mode: TransferMode = unit
                .data
                .require_str("mode")?
                .parse()
                .map_err(anyhow::Error::msg)?;
            let source = unit.data.require_str("source")?.to_string();
            let destination = ctx.resolve(unit.data.require_str("destination")?);
            let verify = unit.data.get_bool("verify").unwrap_or(ctx.verify_transfers);
            let base = ctx.base_dir.clone();

            let copied = tokio::task::spawn_blocking(move || {
                copy_files(&base, &source, &destination, verify)
            })
            .await
            .context("transfer worker panicked")??;

            info!(
                job = %unit.key(),
                mode = mode.as_str(),
                files = copied.len(),
                verified = verify,
                "transfer finished"
            );
            Ok(())
        })
    }
}

/// Copy everything matched by `source` to `destination`.
///
/// Returns the written paths in source order.
pub fn copy_files(base: &Path, source: &str, destination: &Path, verify: bool) -> Result<Vec<PathBuf>> {
    let globbed = is_glob(source);
    let sources = if globbed {
        expand_glob(base, source)?
    } else {
        let path = resolve(base, source);
        ensure!(path.is_file(), "source {} is not a file", path.display());
        vec![path]
    };

    if sources.is_empty() {
        bail!("no files match '{source}'");
    }

    let into_dir = globbed || sources.len() > 1 || destination.is_dir();
    if into_dir {
        fs::create_dir_all(destination)
            .with_context(|| format!("creating directory {}", destination.display()))?;
    } else if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }

    let mut written = Vec::with_capacity(sources.len());
    for src in &sources {
        let target = if into_dir {
            match src.file_name() {
                Some(name) => destination.join(name),
                None => bail!("source {} has no file name", src.display()),
            }
        } else {
            destination.to_path_buf()
        };

        fs::copy(src, &target)
            .with_context(|| format!("copying {} to {}", src.display(), target.display()))?;
        debug!(from = %src.display(), to = %target.display(), "copied file");

        if verify {
            let expected = file_hash(src)?;
            let actual = file_hash(&target)?;
            if expected != actual {
                bail!(
                    "hash mismatch after copying {} to {}",
                    src.display(),
                    target.display()
                );
            }
        }
        written.push(target);
    }

    Ok(written)
}

/// BLAKE3 hash of a file's contents, hex encoded.
pub fn file_hash(path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file =
        File::open(path).with_context(|| format!("opening {} for hashing", path.display()))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

fn is_glob(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

fn resolve(base: &Path, p: &str) -> PathBuf {
    let path = Path::new(p);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Files under the glob's literal prefix that match it, sorted.
fn expand_glob(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let literal: PathBuf = Path::new(pattern)
        .components()
        .take_while(|c| !is_glob(&c.as_os_str().to_string_lossy()))
        .collect();
    let root = resolve(base, &literal.to_string_lossy());

    let full = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        format!(
            "{}/{}",
            globset::escape(&base.to_string_lossy()),
            pattern.trim_start_matches("./")
        )
    };
    let matcher = GlobBuilder::new(&full)
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid glob '{pattern}'"))?
        .compile_matcher();

    let mut found = Vec::new();
    if root.is_dir() {
        walk(&root, &mut |path: &Path| {
            if matcher.is_match(path) {
                found.push(path.to_path_buf());
            }
        })?;
    }
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, visit: &mut dyn FnMut(&Path)) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, visit)?;
        } else {
            visit(&path);
        }
    }
    Ok(())
}
