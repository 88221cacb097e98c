// src/remote/ssh.rs

//! `ssh`-backed executor and the connector that opens executors per host.

use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::errors::{DeployError, Result};
use crate::inventory::{Host, Transport};

use super::executor::{BoxFuture, CommandOutput, RemoteCommand, RemoteExecutor, put_file_command};
use super::local::LocalExecutor;
use super::process::run_captured;

/// Where and as whom an [`SshExecutor`] connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub user: String,
    pub address: String,
    pub key_file: Option<String>,
    pub connect_timeout: Duration,
}

impl SshTarget {
    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }
}

/// Executor that runs every command through the local `ssh` binary.
///
/// The rendered command line is passed as a single argument, so the remote
/// login shell parses it exactly as rendered by [`RemoteCommand::render`].
#[derive(Debug, Clone)]
pub struct SshExecutor {
    target: SshTarget,
    label: String,
}

impl SshExecutor {
    pub fn new(target: SshTarget) -> Self {
        let label = target.destination();
        Self { target, label }
    }

    fn ssh(&self, line: &str) -> Command {
        let mut c = Command::new("ssh");
        c.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.target.connect_timeout.as_secs().max(1)
            ));
        if let Some(key) = &self.target.key_file {
            c.arg("-i").arg(key);
        }
        c.arg(self.target.destination()).arg("--").arg(line);
        c
    }
}

impl RemoteExecutor for SshExecutor {
    fn host(&self) -> &str {
        &self.label
    }

    fn run<'a>(&'a self, cmd: &'a RemoteCommand) -> BoxFuture<'a, Result<CommandOutput>> {
        Box::pin(async move {
            let line = cmd.render();
            debug!(host = %self.label, %line, "ssh");
            let output = run_captured(self.ssh(&line), None, &cmd.command).await?;
            // ssh reserves 255 for its own failures (unreachable host, auth).
            if output.exit_code == Some(255) {
                return Err(DeployError::Transport {
                    step: format!("connecting to {}", self.label),
                    source: std::io::Error::other(output.combined()),
                });
            }
            Ok(output)
        })
    }

    fn put_file<'a>(
        &'a self,
        content: &'a [u8],
        remote_path: &'a str,
        use_sudo: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let cmd = put_file_command(remote_path, use_sudo);
            let output = run_captured(self.ssh(&cmd.render()), Some(content), remote_path).await?;
            if !output.success {
                return Err(DeployError::RemoteCommand {
                    step: format!("writing file {remote_path} on {}", self.label),
                    command: cmd.command,
                    exit_code: output.exit_code,
                    output: output.combined(),
                });
            }
            Ok(())
        })
    }
}

/// Opens an executor for a host, logged in as `user`.
pub trait HostConnector: Send + Sync {
    fn connect(&self, host: &Host, user: &str) -> Arc<dyn RemoteExecutor>;
}

/// Production connector: `ssh` for `transport = "ssh"` hosts, the local shell
/// for `transport = "local"` hosts.
#[derive(Debug, Clone)]
pub struct DefaultConnector {
    pub key_file: Option<String>,
    pub connect_timeout: Duration,
}

impl HostConnector for DefaultConnector {
    fn connect(&self, host: &Host, user: &str) -> Arc<dyn RemoteExecutor> {
        match host.transport {
            Transport::Local => Arc::new(LocalExecutor::new()),
            Transport::Ssh => Arc::new(SshExecutor::new(SshTarget {
                user: user.to_string(),
                address: host.address.clone(),
                key_file: self.key_file.clone(),
                connect_timeout: self.connect_timeout,
            })),
        }
    }
}
