// src/remote/executor.rs

//! Pluggable remote executor abstraction.
//!
//! Deployment code talks to a `RemoteExecutor` instead of spawning `ssh`
//! itself. Production code uses [`super::SshExecutor`] or
//! [`super::LocalExecutor`]; tests provide a scripted fake that records every
//! command and file write.

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::errors::{DeployError, Result};

/// Boxed, sendable future returned by the object-safe traits in this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Quote a string for a POSIX shell on the remote side.
pub fn quote(s: &str) -> String {
    shell_escape::unix::escape(Cow::Borrowed(s)).into_owned()
}

/// A shell command plus the scope it runs in.
///
/// `cwd` and `prefix` mirror the "working directory" and "activation
/// context" scopes: the rendered line is
/// `cd <cwd> && <prefix> && <command>`, wrapped in `sudo -n sh -c` when
/// `sudo` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCommand {
    pub command: String,
    pub sudo: bool,
    pub cwd: Option<String>,
    pub prefix: Option<String>,
}

impl RemoteCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn in_dir(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Render the full shell line sent to the host.
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(3);
        if let Some(dir) = &self.cwd {
            parts.push(format!("cd {}", quote(dir)));
        }
        if let Some(prefix) = &self.prefix {
            parts.push(prefix.clone());
        }
        parts.push(self.command.clone());

        let inner = parts.join(" && ");
        if self.sudo {
            format!("sudo -n sh -c {}", quote(&inner))
        } else {
            inner
        }
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// stdout and stderr joined, for error messages.
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// Trait abstracting how commands reach a host.
///
/// `run` only returns `Err` when the command could not be executed at all
/// (transport failure). A command that ran and exited non-zero is reported as
/// `Ok` with `success == false`; use [`run_checked`] to turn that into a
/// fatal error.
pub trait RemoteExecutor: Send + Sync {
    /// Host this executor is bound to, for logging.
    fn host(&self) -> &str;

    fn run<'a>(&'a self, cmd: &'a RemoteCommand) -> BoxFuture<'a, Result<CommandOutput>>;

    /// Write `content` to `remote_path`, creating parent directories.
    fn put_file<'a>(
        &'a self,
        content: &'a [u8],
        remote_path: &'a str,
        use_sudo: bool,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Run a command and fail with [`DeployError::RemoteCommand`] if it exits
/// unsuccessfully.
pub async fn run_checked(
    exec: &dyn RemoteExecutor,
    cmd: &RemoteCommand,
    step: &str,
) -> Result<CommandOutput> {
    debug!(host = exec.host(), step, cmd = %cmd.command, "running remote command");
    let output = exec.run(cmd).await?;
    if !output.success {
        return Err(DeployError::RemoteCommand {
            step: step.to_string(),
            command: cmd.command.clone(),
            exit_code: output.exit_code,
            output: output.combined(),
        });
    }
    Ok(output)
}

/// The command used by executors to stream file content into `remote_path`.
pub(crate) fn put_file_command(remote_path: &str, use_sudo: bool) -> RemoteCommand {
    let dir = match remote_path.rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((dir, _)) => dir.to_string(),
        None => ".".to_string(),
    };
    RemoteCommand::new(format!(
        "mkdir -p {} && cat > {} && test -f {}",
        quote(&dir),
        quote(remote_path),
        quote(remote_path)
    ))
    .sudo(use_sudo)
}
