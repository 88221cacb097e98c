// src/tools/mod.rs

//! Host tool provisioning.
//!
//! A [`ToolRegistry`] maps tool names (as listed under `roles.<name>.tools`)
//! to [`Tool`] implementations. It is built once from the built-in table plus
//! `[tools.<name>]` overrides.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::config::ToolConfig;
use crate::errors::{DeployError, Result};
use crate::remote::{BoxFuture, RemoteExecutor};
use crate::types::PackageManager;

pub mod package;

pub use package::{BUILTIN_TOOLS, PackageTool, detect_package_manager};

/// Whether `name` is known without a `[tools.<name>]` section.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_TOOLS.iter().any(|(tool, _, _)| *tool == name)
}

/// Something that can be detected on and installed onto a host.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the tool is already present.
    fn check<'a>(&'a self, exec: &'a dyn RemoteExecutor) -> BoxFuture<'a, Result<bool>>;

    fn install<'a>(
        &'a self,
        exec: &'a dyn RemoteExecutor,
        manager: PackageManager,
        use_sudo: bool,
    ) -> BoxFuture<'a, Result<()>>;
}

/// What [`ToolRegistry::provision`] did for one tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    AlreadyPresent,
    Installed,
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Built-in tools, overridden or extended by `[tools.<name>]`.
    pub fn from_config(configured: &BTreeMap<String, ToolConfig>) -> Self {
        let mut registry = Self::default();
        for (name, package, check) in BUILTIN_TOOLS {
            registry.register(Arc::new(PackageTool::builtin(name, package, check)));
        }
        for (name, cfg) in configured {
            registry.register(Arc::new(PackageTool::from_config(name, cfg)));
        }
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| DeployError::ToolNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Check each named tool and install the missing ones. A tool that still
    /// fails its check after installing is an error.
    pub async fn provision(
        &self,
        exec: &dyn RemoteExecutor,
        names: &[String],
        use_sudo: bool,
    ) -> Result<Vec<(String, Provisioned)>> {
        let mut manager = None;
        let mut report = Vec::with_capacity(names.len());

        for name in names {
            let tool = self.get(name)?;
            if tool.check(exec).await? {
                info!(host = exec.host(), tool = %name, "tool present");
                report.push((name.clone(), Provisioned::AlreadyPresent));
                continue;
            }

            let pm = match manager {
                Some(pm) => pm,
                None => {
                    let pm = detect_package_manager(exec).await?;
                    manager = Some(pm);
                    pm
                }
            };
            tool.install(exec, pm, use_sudo).await?;
            if !tool.check(exec).await? {
                return Err(DeployError::halt(format!(
                    "tool '{name}' is still missing on {} after installing it",
                    exec.host()
                )));
            }
            info!(host = exec.host(), tool = %name, ?pm, "installed tool");
            report.push((name.clone(), Provisioned::Installed));
        }
        Ok(report)
    }
}
