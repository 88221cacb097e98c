// src/supervisor.rs

//! Process supervisor interface and its `supervisord` implementation.
//!
//! The activator only ever talks to a [`ProcessSupervisor`]; tests swap in a
//! recording fake.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::join;
use crate::errors::{DeployError, Result};
use crate::remote::{BoxFuture, RemoteCommand, RemoteExecutor, quote, run_checked};

/// Everything needed to register one supervised program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDefinition {
    pub name: String,
    pub command: String,
    /// Working directory of the program.
    pub directory: String,
    /// Directory receiving the program's combined stdout/stderr log.
    pub log_dir: String,
}

/// Narrow interface over a process supervisor.
pub trait ProcessSupervisor: Send + Sync {
    /// Persist the program definition. Does not start it.
    fn write_program<'a>(&'a self, def: &'a ProgramDefinition) -> BoxFuture<'a, Result<()>>;

    /// Load a written definition and start the program.
    fn start<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Stop the program, unregister it and delete its definition.
    fn stop_and_remove<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Raw status word, e.g. `RUNNING`, `STARTING`, `FATAL`. An `Err` means
    /// the status could not be determined.
    fn status<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Re-read every definition.
    fn reload(&self) -> BoxFuture<'_, Result<()>>;
}

/// `supervisord` driven through `supervisorctl` on the host.
pub struct Supervisorctl {
    exec: Arc<dyn RemoteExecutor>,
    include_conf: String,
    use_sudo: bool,
}

impl Supervisorctl {
    pub fn new(exec: Arc<dyn RemoteExecutor>, include_conf: impl Into<String>, use_sudo: bool) -> Self {
        Self {
            exec,
            include_conf: include_conf.into(),
            use_sudo,
        }
    }

    pub fn conf_path(&self, name: &str) -> String {
        join(&self.include_conf, &format!("{name}.conf"))
    }

    fn ctl(&self, args: &str) -> RemoteCommand {
        RemoteCommand::new(format!("supervisorctl {args}")).sudo(self.use_sudo)
    }
}

/// Text of a `[program:<name>]` section.
pub fn render_program(def: &ProgramDefinition) -> String {
    let log_file = join(&def.log_dir, "supervisord.log");
    format!(
        "[program:{name}]\n\
         command={command}\n\
         directory={directory}\n\
         user=nobody\n\
         autostart=true\n\
         autorestart=true\n\
         stdout_logfile={log_file}\n\
         redirect_stderr=true\n",
        name = def.name,
        command = def.command,
        directory = def.directory,
    )
}

impl ProcessSupervisor for Supervisorctl {
    fn write_program<'a>(&'a self, def: &'a ProgramDefinition) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mkdir = RemoteCommand::new(format!("mkdir -p {}", quote(&def.log_dir))).sudo(self.use_sudo);
            run_checked(self.exec.as_ref(), &mkdir, "creating program log directory").await?;

            let path = self.conf_path(&def.name);
            self.exec
                .put_file(render_program(def).as_bytes(), &path, self.use_sudo)
                .await?;
            info!(host = self.exec.host(), program = %def.name, %path, "wrote supervisor program");
            Ok(())
        })
    }

    fn start<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            run_checked(self.exec.as_ref(), &self.ctl("reread"), "re-reading supervisor config").await?;
            let add = self.ctl(&format!("add {}", quote(name)));
            let out = run_checked(self.exec.as_ref(), &add, "adding supervisor program").await?;
            // supervisorctl reports some failures with exit code 0.
            if out.stdout.contains("ERROR") {
                return Err(DeployError::RemoteCommand {
                    step: "adding supervisor program".to_string(),
                    command: add.command,
                    exit_code: out.exit_code,
                    output: out.combined(),
                });
            }
            info!(host = self.exec.host(), program = name, "started supervisor program");
            Ok(())
        })
    }

    fn stop_and_remove<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for verb in ["stop", "remove"] {
                let out = self.exec.run(&self.ctl(&format!("{verb} {}", quote(name)))).await?;
                if !out.success {
                    debug!(program = name, verb, output = %out.combined(), "ignoring supervisorctl failure");
                }
            }
            let rm = RemoteCommand::new(format!("rm -f {}", quote(&self.conf_path(name)))).sudo(self.use_sudo);
            run_checked(self.exec.as_ref(), &rm, "deleting supervisor program").await?;
            self.reload().await?;
            info!(host = self.exec.host(), program = name, "stopped and removed supervisor program");
            Ok(())
        })
    }

    fn status<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            // Non-running programs make `supervisorctl status` exit non-zero,
            // so only the output is inspected.
            let out = self.exec.run(&self.ctl(&format!("status {}", quote(name)))).await?;
            match parse_status_line(&out.stdout) {
                Some(status) => Ok(status),
                None => {
                    warn!(program = name, output = %out.combined(), "unparsable supervisor status");
                    Err(DeployError::halt(format!(
                        "could not determine status of program '{name}': {}",
                        out.combined()
                    )))
                }
            }
        })
    }

    fn reload(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            run_checked(self.exec.as_ref(), &self.ctl("update"), "updating supervisor").await?;
            Ok(())
        })
    }
}

/// Second whitespace-separated field of `supervisorctl status` output.
pub fn parse_status_line(output: &str) -> Option<String> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    let status = line.split_whitespace().nth(1)?;
    // `<name>: ERROR (no such process)`
    if status == "ERROR" {
        return None;
    }
    if status.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
        Some(status.to_string())
    } else {
        None
    }
}
