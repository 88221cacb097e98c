// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::activation::ActivationSpec;
use crate::build::{BuildPlan, BuildSpec, CopyFromSpec, PostBuildCommand};
use crate::inventory::Host;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [context]
/// name = "shop"
///
/// [repos.api]
/// url = "git@github.com:acme/api.git"
///
/// [[hosts]]
/// name = "web-1"
/// address = "web-1.example.com"
/// role = "web"
///
/// [roles.web]
/// user = "deploy"
///
/// [roles.web.build.plan]
/// repos = ["api"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub context: ContextSection,

    #[serde(default)]
    pub tags: TagNames,

    #[serde(default)]
    pub repos: BTreeMap<String, RepoConfig>,

    #[serde(default)]
    pub tools: BTreeMap<String, ToolConfig>,

    #[serde(default)]
    pub hosts: Vec<Host>,

    #[serde(default)]
    pub roles: BTreeMap<String, RawRoleConfig>,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub context: ContextSection,
    pub tags: TagNames,
    pub repos: BTreeMap<String, RepoConfig>,
    pub tools: BTreeMap<String, ToolConfig>,
    pub hosts: Vec<Host>,
    pub roles: BTreeMap<String, RoleConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        raw: RawConfigFile,
        roles: BTreeMap<String, RoleConfig>,
    ) -> Self {
        Self {
            context: raw.context,
            tags: raw.tags,
            repos: raw.repos,
            tools: raw.tools,
            hosts: raw.hosts,
            roles,
        }
    }

    pub fn role(&self, name: &str) -> crate::errors::Result<&RoleConfig> {
        self.roles
            .get(name)
            .ok_or_else(|| crate::errors::DeployError::RoleNotFound(name.to_string()))
    }
}

/// `[context]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextSection {
    /// Context name; prefixes every build name.
    pub name: String,

    #[serde(default = "default_deploy_root")]
    pub deploy_root: String,

    #[serde(default = "default_builds_dir")]
    pub builds_dir: String,

    #[serde(default = "default_repos_dir")]
    pub repos_dir: String,

    #[serde(default = "default_supervisor_include_conf")]
    pub supervisor_include_conf: String,

    #[serde(default = "default_nginx_include_conf")]
    pub nginx_include_conf: String,

    /// Key file name (under `~/.ssh` on the hosts) used for host-to-host copies.
    #[serde(default)]
    pub machine_key: Option<String>,

    /// Use `sudo` for writes outside the login user's home.
    #[serde(default = "default_use_sudo")]
    pub use_sudo: bool,

    /// Local key file passed to `ssh -i`.
    #[serde(default)]
    pub ssh_key_file: Option<String>,

    /// Total number of status polls when waiting for a backend.
    #[serde(default = "default_ready_tries")]
    pub ready_tries: u32,

    /// Wait before the second poll; doubles after every poll.
    #[serde(default = "default_ready_wait")]
    pub ready_wait: String,

    #[serde(default = "default_ssh_connect_timeout")]
    pub ssh_connect_timeout: String,
}

fn default_deploy_root() -> String {
    "/opt/www".to_string()
}

fn default_builds_dir() -> String {
    "builds".to_string()
}

fn default_repos_dir() -> String {
    "repos".to_string()
}

fn default_supervisor_include_conf() -> String {
    "/etc/supervisor/conf.d".to_string()
}

fn default_nginx_include_conf() -> String {
    "/etc/nginx/conf.d".to_string()
}

fn default_use_sudo() -> bool {
    true
}

fn default_ready_tries() -> u32 {
    4
}

fn default_ready_wait() -> String {
    "2s".to_string()
}

fn default_ssh_connect_timeout() -> String {
    "10s".to_string()
}

/// `[tags]` section: tag names written to the instance directory.
#[derive(Debug, Clone, Deserialize)]
pub struct TagNames {
    #[serde(default = "default_last_good_tag")]
    pub last_good_build: String,

    #[serde(default = "default_active_tag")]
    pub active_build: String,
}

fn default_last_good_tag() -> String {
    "last_good_build".to_string()
}

fn default_active_tag() -> String {
    "active_build".to_string()
}

impl Default for TagNames {
    fn default() -> Self {
        Self {
            last_good_build: default_last_good_tag(),
            active_build: default_active_tag(),
        }
    }
}

/// `[repos.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    pub url: String,

    /// Checkout directory under the repos root. Defaults to the last URL
    /// segment without its extension.
    #[serde(default)]
    pub dir: Option<String>,

    /// Package installed from this repo. Defaults to the directory name.
    #[serde(default)]
    pub package_name: Option<String>,
}

impl RepoConfig {
    pub fn dir(&self) -> String {
        if let Some(dir) = self.dir.as_deref().filter(|d| !d.is_empty()) {
            return dir.to_string();
        }
        let last = self
            .url
            .trim_end_matches('/')
            .rsplit(['/', ':'])
            .next()
            .unwrap_or(&self.url);
        last.split('.').next().unwrap_or(last).to_string()
    }

    pub fn package_name(&self) -> String {
        self.package_name
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.dir())
    }
}

/// `[tools.<name>]` section: how to detect and install a host tool.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub check: Option<String>,

    #[serde(default)]
    pub yum: Option<String>,

    #[serde(default)]
    pub apt: Option<String>,
}

/// `[roles.<name>]` section as written.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRoleConfig {
    /// Login user on hosts of this role.
    pub user: String,

    /// Tools verified by `provision`.
    #[serde(default)]
    pub tools: Vec<String>,

    #[serde(default)]
    pub build: Option<RawBuildSection>,

    #[serde(default)]
    pub activate: Option<ActivationSpec>,
}

/// `[roles.<name>.build]`: `plan` and `copy_from` are mutually exclusive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBuildSection {
    #[serde(default)]
    pub plan: Option<BuildPlan>,

    #[serde(default)]
    pub copy_from: Option<CopyFromSpec>,

    #[serde(default)]
    pub post_build: Vec<PostBuildCommand>,
}

/// Validated role.
#[derive(Debug, Clone)]
pub struct RoleConfig {
    pub name: String,
    pub user: String,
    pub tools: Vec<String>,
    pub build: Option<BuildSpec>,
    pub activate: Option<ActivationSpec>,
}
