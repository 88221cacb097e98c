// src/remote/probe.rs

//! Read-only host queries used by the build pipeline and the activator.

use tracing::{debug, info};

use crate::errors::{DeployError, Result};

use super::executor::{RemoteCommand, RemoteExecutor, quote, run_checked};

const UNUSED_PORT_CMD: &str = "python3 -c \"import socket; s = socket.socket(); \
s.bind(('127.0.0.1', 0)); print(s.getsockname()[1]); s.close()\"";

/// Ask the host's kernel for a free local TCP port.
///
/// The port is released again before returning, so another process could
/// grab it before the backend binds.
pub async fn unused_port(exec: &dyn RemoteExecutor) -> Result<u16> {
    let out = run_checked(exec, &RemoteCommand::new(UNUSED_PORT_CMD), "finding an unused port").await?;
    let port = out.stdout_trimmed().parse::<u16>().map_err(|e| {
        DeployError::halt(format!(
            "unexpected output while finding an unused port: {:?} ({e})",
            out.stdout_trimmed()
        ))
    })?;
    info!(host = exec.host(), port, "found unused port");
    Ok(port)
}

/// Number of CPUs available on the host.
pub async fn cpu_count(exec: &dyn RemoteExecutor) -> Result<u32> {
    let out = run_checked(exec, &RemoteCommand::new("nproc"), "retrieving CPU count").await?;
    let count = out.stdout_trimmed().parse::<u32>().map_err(|e| {
        DeployError::halt(format!(
            "unexpected output while retrieving CPU count: {:?} ({e})",
            out.stdout_trimmed()
        ))
    })?;
    debug!(host = exec.host(), count, "found CPU count");
    Ok(count)
}

/// Issue an HTTP `HEAD` request from the host itself and return the status
/// code. A transport-level curl failure is reported as an error.
pub async fn http_status(exec: &dyn RemoteExecutor, url: &str) -> Result<u16> {
    let cmd = RemoteCommand::new(format!(
        "curl -s -o /dev/null -I -w '%{{http_code}}' {}",
        quote(url)
    ));
    let out = run_checked(exec, &cmd, "probing backend over HTTP").await?;
    out.stdout_trimmed().parse::<u16>().map_err(|e| {
        DeployError::halt(format!(
            "unexpected curl output for {url}: {:?} ({e})",
            out.stdout_trimmed()
        ))
    })
}

pub async fn file_exists(exec: &dyn RemoteExecutor, path: &str) -> Result<bool> {
    let out = exec
        .run(&RemoteCommand::new(format!("test -f {}", quote(path))))
        .await?;
    Ok(out.success)
}

pub async fn dir_exists(exec: &dyn RemoteExecutor, path: &str) -> Result<bool> {
    let out = exec
        .run(&RemoteCommand::new(format!("test -d {}", quote(path))))
        .await?;
    Ok(out.success)
}
