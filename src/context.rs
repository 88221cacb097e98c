// src/context.rs

//! The deployment context: the named layout every host of a project shares.
//!
//! A `DeployContext` is built once from `[context]` and passed by reference
//! to every component; nothing reads it from ambient state.

use std::time::Duration;

use crate::config::ContextSection;
use crate::types::parse_duration;

/// File name of the persisted build registry inside the context root.
pub const REGISTRY_FILE: &str = "build_info.json";

/// Join POSIX path segments without touching the local filesystem.
pub fn join(base: &str, rest: &str) -> String {
    if rest.starts_with('/') {
        return rest.to_string();
    }
    if base.is_empty() {
        return rest.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), rest)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployContext {
    pub name: String,
    pub deploy_root: String,
    pub builds_dir: String,
    pub repos_dir: String,
    /// Key file name under `~/.ssh` that hosts use to reach each other
    /// (for `copy_from`).
    pub machine_key: Option<String>,
    /// Run privileged writes (registry, supervisor and proxy files) through
    /// `sudo`.
    pub use_sudo: bool,
    pub ready_tries: u32,
    pub ready_wait: Duration,
}

impl DeployContext {
    /// Build from an already validated `[context]` section.
    pub fn from_section(section: &ContextSection) -> Self {
        Self {
            name: section.name.clone(),
            deploy_root: section.deploy_root.clone(),
            builds_dir: section.builds_dir.clone(),
            repos_dir: section.repos_dir.clone(),
            machine_key: section.machine_key.clone(),
            use_sudo: section.use_sudo,
            ready_tries: section.ready_tries,
            ready_wait: parse_duration(&section.ready_wait).unwrap_or(Duration::from_secs(2)),
        }
    }

    /// `<deploy_root>/<name>`
    pub fn root(&self) -> String {
        join(&self.deploy_root, &self.name)
    }

    pub fn builds_root(&self) -> String {
        join(&self.root(), &self.builds_dir)
    }

    pub fn build_path(&self, file_or_dir: &str) -> String {
        join(&self.builds_root(), file_or_dir)
    }

    pub fn repos_root(&self) -> String {
        join(&self.root(), &self.repos_dir)
    }

    pub fn repo_path(&self, dir: &str) -> String {
        join(&self.repos_root(), dir)
    }

    pub fn registry_path(&self) -> String {
        join(&self.root(), REGISTRY_FILE)
    }

    pub fn logs_root(&self) -> String {
        join(&self.root(), "logs")
    }

    pub fn tarball_name(build_name: &str) -> String {
        format!("{build_name}.tar.gz")
    }

    pub fn machine_key_path(&self) -> Option<String> {
        self.machine_key.as_ref().map(|k| format!("~/.ssh/{k}"))
    }
}
