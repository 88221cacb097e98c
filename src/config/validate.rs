// src/config/validate.rs

use std::collections::{BTreeMap, HashSet};

use crate::build::{BuildSource, BuildSpec};
use crate::config::model::{ConfigFile, RawConfigFile, RawRoleConfig, RoleConfig};
use crate::errors::{DeployError, Result};
use crate::tools;
use crate::types::{is_valid_name, parse_duration};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DeployError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let roles = resolve_roles(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, roles))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_context(cfg)?;
    validate_hosts(cfg)?;
    validate_role_tools(cfg)?;
    validate_activation_keys(cfg)?;
    Ok(())
}

fn validate_context(cfg: &RawConfigFile) -> Result<()> {
    let ctx = &cfg.context;
    if !is_valid_name(&ctx.name) {
        return Err(DeployError::ConfigError(format!(
            "[context].name '{}' may only contain letters, digits, '_' and '-'",
            ctx.name
        )));
    }

    if ctx.ready_tries == 0 {
        return Err(DeployError::ConfigError(
            "[context].ready_tries must be >= 1 (got 0)".to_string(),
        ));
    }

    for (field, value) in [
        ("ready_wait", &ctx.ready_wait),
        ("ssh_connect_timeout", &ctx.ssh_connect_timeout),
    ] {
        parse_duration(value).map_err(|e| {
            DeployError::ConfigError(format!("[context].{field} = {value:?}: {e}"))
        })?;
    }

    Ok(())
}

fn validate_hosts(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for host in &cfg.hosts {
        if !seen.insert(host.name.as_str()) {
            return Err(DeployError::ConfigError(format!(
                "host '{}' is declared more than once",
                host.name
            )));
        }
        if !cfg.roles.contains_key(&host.role) {
            return Err(DeployError::ConfigError(format!(
                "host '{}' references unknown role '{}'",
                host.name, host.role
            )));
        }
    }
    Ok(())
}

fn validate_role_tools(cfg: &RawConfigFile) -> Result<()> {
    for (name, role) in &cfg.roles {
        for tool in &role.tools {
            if !cfg.tools.contains_key(tool) && !tools::is_builtin(tool) {
                return Err(DeployError::ConfigError(format!(
                    "role '{}' lists unknown tool '{}'",
                    name, tool
                )));
            }
        }
    }
    Ok(())
}

fn validate_activation_keys(cfg: &RawConfigFile) -> Result<()> {
    for (name, role) in &cfg.roles {
        if let Some(activate) = &role.activate {
            if !is_valid_name(&activate.key) {
                return Err(DeployError::ConfigError(format!(
                    "role '{}': activation key '{}' may only contain letters, digits, '_' and '-'",
                    name, activate.key
                )));
            }
            if activate.backend.app_module.trim().is_empty() {
                return Err(DeployError::ConfigError(format!(
                    "role '{}': activate.backend.app_module must not be empty",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn resolve_roles(cfg: &RawConfigFile) -> Result<BTreeMap<String, RoleConfig>> {
    cfg.roles
        .iter()
        .map(|(name, raw)| {
            let build = resolve_build(cfg, name, raw)?;
            Ok((
                name.clone(),
                RoleConfig {
                    name: name.clone(),
                    user: raw.user.clone(),
                    tools: raw.tools.clone(),
                    build,
                    activate: raw.activate.clone(),
                },
            ))
        })
        .collect()
}

/// Turn a raw `[roles.<name>.build]` into a [`BuildSpec`], enforcing that
/// exactly one of `plan` / `copy_from` is present.
fn resolve_build(cfg: &RawConfigFile, role: &str, raw: &RawRoleConfig) -> Result<Option<BuildSpec>> {
    let Some(section) = &raw.build else {
        return Ok(None);
    };

    let source = match (&section.plan, &section.copy_from) {
        (Some(plan), None) => {
            let test_repo = plan.test_plan.as_ref().and_then(|t| t.repo.as_deref());
            validate_plan_repos(cfg, role, &plan.repos, plan.reference_repo.as_deref(), test_repo)?;
            BuildSource::Plan(plan.clone())
        }
        (None, Some(copy)) => {
            if !cfg.roles.contains_key(&copy.role) {
                return Err(DeployError::ConfigError(format!(
                    "role '{}': build.copy_from references unknown role '{}'",
                    role, copy.role
                )));
            }
            if copy.role == role {
                return Err(DeployError::ConfigError(format!(
                    "role '{}': build.copy_from cannot copy from itself",
                    role
                )));
            }
            BuildSource::CopyFrom(copy.clone())
        }
        (Some(_), Some(_)) => {
            return Err(DeployError::ConfigError(format!(
                "role '{}': build.plan and build.copy_from are mutually exclusive",
                role
            )));
        }
        (None, None) => {
            return Err(DeployError::ConfigError(format!(
                "role '{}': build needs either build.plan or build.copy_from",
                role
            )));
        }
    };

    for cmd in &section.post_build {
        if cmd.command.trim().is_empty() {
            return Err(DeployError::ConfigError(format!(
                "role '{}': post_build command must not be empty",
                role
            )));
        }
    }

    Ok(Some(BuildSpec {
        source,
        post_build: section.post_build.clone(),
    }))
}

fn validate_plan_repos(
    cfg: &RawConfigFile,
    role: &str,
    repos: &[String],
    reference: Option<&str>,
    test_repo: Option<&str>,
) -> Result<()> {
    if repos.is_empty() {
        return Err(DeployError::ConfigError(format!(
            "role '{}': build.plan.repos must list at least one repository",
            role
        )));
    }
    for repo in repos.iter().map(String::as_str).chain(reference).chain(test_repo) {
        if !cfg.repos.contains_key(repo) {
            return Err(DeployError::ConfigError(format!(
                "role '{}': build.plan references unknown repo '{}'",
                role, repo
            )));
        }
    }
    Ok(())
}
