// src/remote/process.rs

//! Child process runner shared by the local and ssh executors.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::errors::{DeployError, Result};

use super::CommandOutput;

/// Spawn `cmd`, optionally feed `stdin`, and wait for it to exit.
///
/// Output is captured in full. Spawn and wait failures map to
/// [`DeployError::Transport`]; a non-zero exit is a normal `Ok` result.
pub async fn run_captured(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    step: &str,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| DeployError::Transport {
        step: format!("spawning process for {step}"),
        source,
    })?;

    if let Some(bytes) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(bytes)
                .await
                .map_err(|source| DeployError::Transport {
                    step: format!("writing stdin for {step}"),
                    source,
                })?;
            // Dropping the pipe closes it so `cat > file` can finish.
            drop(pipe);
        }
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|source| DeployError::Transport {
            step: format!("waiting for process of {step}"),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    for line in stderr.lines() {
        trace!(step, "stderr: {}", line);
    }

    let code = output.status.code();
    debug!(step, exit_code = ?code, success = output.status.success(), "process exited");

    Ok(CommandOutput {
        success: output.status.success(),
        exit_code: code,
        stdout,
        stderr,
    })
}
