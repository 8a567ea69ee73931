//! Running external utilities (office converter, transcoder, probe) with a
//! time bound and cancellation.
//!
//! The child is spawned with `kill_on_drop`, so abandoning the future on
//! timeout or cancellation also kills the process.

use crate::cancel::CancelSignal;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Why an external utility did not complete successfully.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("'{program}' is not installed or not on PATH")]
    NotFound { program: String },

    #[error("'{program}' exceeded its {secs}s time limit")]
    TimedOut { program: String, secs: u64 },

    #[error("'{program}' was cancelled")]
    Cancelled { program: String },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("could not run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured output of a successful run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Stderr is cut to this many bytes in error messages.
const STDERR_TAIL: usize = 2000;

/// Run `program args…` to completion, bounded by `timeout` and `cancel`.
pub async fn run_tool(
    program: &Path,
    args: &[String],
    timeout: Duration,
    cancel: &CancelSignal,
) -> Result<ToolOutput, ToolError> {
    let name = program.display().to_string();
    debug!("Running {} {}", name, args.join(" "));

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ToolError::NotFound {
                program: name.clone(),
            },
            _ => ToolError::Spawn {
                program: name.clone(),
                source,
            },
        })?;

    let output = tokio::select! {
        res = tokio::time::timeout(timeout, child.wait_with_output()) => match res {
            Ok(output) => output.map_err(|source| ToolError::Spawn {
                program: name.clone(),
                source,
            })?,
            Err(_) => {
                return Err(ToolError::TimedOut {
                    program: name,
                    secs: timeout.as_secs(),
                })
            }
        },
        _ = cancel.cancelled() => return Err(ToolError::Cancelled { program: name }),
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(ToolError::Failed {
            program: name,
            status: output.status.to_string(),
            stderr: tail(&stderr, STDERR_TAIL).to_string(),
        });
    }
    Ok(ToolOutput { stdout, stderr })
}

fn tail(s: &str, max: usize) -> &str {
    let s = s.trim();
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
