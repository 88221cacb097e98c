// src/registry.rs

//! Persisted build registry.
//!
//! One JSON file per deployment context and host records:
//!
//! - `number`: the most recently issued build number (that build may have
//!   failed),
//! - `last`: the last build that completed its pipeline,
//! - `active`: per deployment key, the build currently serving traffic and
//!   the port its backend listens on.
//!
//! The registry is loaded fresh at the start of every run and every mutating
//! call persists before returning. There is no locking: two operators
//! driving the same host race, and the last write wins.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::DeployContext;
use crate::errors::{DeployError, Result};
use crate::remote::probe::file_exists;
use crate::remote::{RemoteCommand, RemoteExecutor, quote, run_checked};

/// Record of what is serving traffic for one key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveDeployment {
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub port: u16,
}

/// The serialized registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub last: Option<String>,
    #[serde(default)]
    pub active: BTreeMap<String, ActiveDeployment>,
}

/// `"{context}_{number:05}_{commit}"`
pub fn build_name(context: &str, number: u64, commit: &str) -> String {
    format!("{context}_{number:05}_{commit}")
}

/// `"{build}_{key}"`: names the supervised program and its proxy config.
pub fn program_name(build: &str, key: &str) -> String {
    format!("{build}_{key}")
}

/// Handle on one host's registry file.
pub struct BuildRegistry {
    exec: Arc<dyn RemoteExecutor>,
    context_name: String,
    path: String,
    use_sudo: bool,
    state: RegistryState,
}

impl std::fmt::Debug for BuildRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildRegistry")
            .field("host", &self.exec.host())
            .field("context_name", &self.context_name)
            .field("path", &self.path)
            .field("state", &self.state)
            .finish()
    }
}

impl BuildRegistry {
    /// Load the registry of `ctx` from the host behind `exec`, or start from
    /// defaults if no file exists yet.
    pub async fn load(exec: Arc<dyn RemoteExecutor>, ctx: &DeployContext) -> Result<Self> {
        let path = ctx.registry_path();
        let state = if file_exists(exec.as_ref(), &path).await? {
            let cmd = RemoteCommand::new(format!("cat {}", quote(&path)));
            let out = run_checked(exec.as_ref(), &cmd, "reading build registry")
                .await
                .map_err(|e| DeployError::RegistryCorrupt {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            serde_json::from_str(&out.stdout).map_err(|e| DeployError::RegistryCorrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?
        } else {
            debug!(host = exec.host(), %path, "no registry file; starting from defaults");
            RegistryState::default()
        };

        Ok(Self {
            exec,
            context_name: ctx.name.clone(),
            path,
            use_sudo: ctx.use_sudo,
            state,
        })
    }

    pub fn state(&self) -> &RegistryState {
        &self.state
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn number(&self) -> u64 {
        self.state.number
    }

    /// Last known good build, if any.
    pub fn last(&self) -> Option<&str> {
        self.state.last.as_deref()
    }

    /// Allocate the next build number and persist it before returning the
    /// new build name. A number is consumed even if the build later fails.
    pub async fn next_build_name(&mut self, commit: &str) -> Result<String> {
        let number = self.state.number + 1;
        let name = build_name(&self.context_name, number, commit.trim());
        self.state.number = number;
        self.save().await?;
        info!(host = self.exec.host(), build = %name, "allocated build name");
        Ok(name)
    }

    pub async fn mark_last_good(&mut self, build: &str) -> Result<()> {
        self.state.last = Some(build.to_string());
        self.save().await?;
        info!(host = self.exec.host(), build, "marked last known good build");
        Ok(())
    }

    /// Live record for `key`, inserted empty if absent. Changes are only
    /// durable after [`BuildRegistry::save`].
    pub fn active(&mut self, key: &str) -> &mut ActiveDeployment {
        self.state.active.entry(key.to_string()).or_default()
    }

    /// Read-only view of `key`'s record; absent keys read as empty.
    pub fn active_of(&self, key: &str) -> ActiveDeployment {
        self.state.active.get(key).cloned().unwrap_or_default()
    }

    /// Write the full state to a temporary file and rename it over the
    /// registry path.
    pub async fn save(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.state)?;
        let tmp = format!("{}.tmp", self.path);
        self.exec.put_file(text.as_bytes(), &tmp, self.use_sudo).await?;
        let mv = RemoteCommand::new(format!("mv -f {} {}", quote(&tmp), quote(&self.path))).sudo(self.use_sudo);
        run_checked(self.exec.as_ref(), &mv, "saving build registry").await?;
        debug!(host = self.exec.host(), path = %self.path, "saved build registry");
        Ok(())
    }
}
