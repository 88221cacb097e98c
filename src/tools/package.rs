// src/tools/package.rs

use crate::config::ToolConfig;
use crate::errors::{DeployError, Result};
use crate::remote::{BoxFuture, RemoteCommand, RemoteExecutor, quote, run_checked};
use crate::types::PackageManager;

use super::Tool;

/// `(tool name, package name, check command)` for tools every host may need.
pub const BUILTIN_TOOLS: [(&str, &str, &str); 5] = [
    ("curl", "curl", "which curl"),
    ("git", "git", "which git"),
    ("nginx", "nginx", "which nginx"),
    ("supervisord", "supervisor", "which supervisorctl"),
    ("virtualenv", "virtualenv", "which virtualenv"),
];

/// A tool installed from a system package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageTool {
    name: String,
    check: String,
    yum: String,
    apt: String,
}

impl PackageTool {
    pub fn builtin(name: &str, package: &str, check: &str) -> Self {
        Self {
            name: name.to_string(),
            check: check.to_string(),
            yum: package.to_string(),
            apt: package.to_string(),
        }
    }

    /// Missing fields default to the tool name (`which <name>` for `check`).
    pub fn from_config(name: &str, cfg: &ToolConfig) -> Self {
        Self {
            name: name.to_string(),
            check: cfg
                .check
                .clone()
                .unwrap_or_else(|| format!("which {}", quote(name))),
            yum: cfg.yum.clone().unwrap_or_else(|| name.to_string()),
            apt: cfg.apt.clone().unwrap_or_else(|| name.to_string()),
        }
    }

    pub fn install_command(&self, manager: PackageManager) -> String {
        match manager {
            PackageManager::Yum => format!("yum install -y {}", self.yum),
            PackageManager::Apt => format!(
                "DEBIAN_FRONTEND=noninteractive apt-get install -y {}",
                self.apt
            ),
        }
    }
}

impl Tool for PackageTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn check<'a>(&'a self, exec: &'a dyn RemoteExecutor) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let out = exec.run(&RemoteCommand::new(self.check.clone())).await?;
            Ok(out.success)
        })
    }

    fn install<'a>(
        &'a self,
        exec: &'a dyn RemoteExecutor,
        manager: PackageManager,
        use_sudo: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let cmd = RemoteCommand::new(self.install_command(manager)).sudo(use_sudo);
            run_checked(exec, &cmd, &format!("installing {}", self.name)).await?;
            Ok(())
        })
    }
}

/// `yum` if present, else `apt-get`.
pub async fn detect_package_manager(exec: &dyn RemoteExecutor) -> Result<PackageManager> {
    for (probe, manager) in [
        ("which yum", PackageManager::Yum),
        ("which apt-get", PackageManager::Apt),
    ] {
        if exec.run(&RemoteCommand::new(probe)).await?.success {
            return Ok(manager);
        }
    }
    Err(DeployError::halt(format!(
        "no supported package manager (yum, apt-get) on {}",
        exec.host()
    )))
}
