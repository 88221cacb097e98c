// src/remote/local.rs

use tokio::process::Command;

use crate::errors::{DeployError, Result};

use super::executor::{BoxFuture, CommandOutput, RemoteCommand, RemoteExecutor, put_file_command};
use super::process::run_captured;

/// Executor that runs commands on the local machine through `sh -c`.
///
/// Used for hosts declared with `transport = "local"` and by on-disk tests.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        Self
    }

    fn shell(line: &str) -> Command {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    }
}

impl RemoteExecutor for LocalExecutor {
    fn host(&self) -> &str {
        "localhost"
    }

    fn run<'a>(&'a self, cmd: &'a RemoteCommand) -> BoxFuture<'a, Result<CommandOutput>> {
        Box::pin(async move {
            let line = cmd.render();
            run_captured(Self::shell(&line), None, &cmd.command).await
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
            let output = run_captured(Self::shell(&cmd.render()), Some(content), remote_path).await?;
            if !output.success {
                return Err(DeployError::RemoteCommand {
                    step: format!("writing file {remote_path}"),
                    command: cmd.command,
                    exit_code: output.exit_code,
                    output: output.combined(),
                });
            }
            Ok(())
        })
    }
}
