// src/commands.rs

//! Per-host command handlers behind the CLI subcommands.
//!
//! A [`Deployment`] holds everything resolved once at startup (config,
//! context, instance directory, connector, tool registry). Each handler
//! operates on a single host; [`Deployment::run_on_role`] walks the hosts of
//! a role one after another and stops at the first fatal error.

use std::sync::Arc;

use tracing::{info, warn};

use crate::activation::{ActivationOutcome, Activator};
use crate::build::BuildPipeline;
use crate::cli::Command;
use crate::config::{ConfigFile, RoleConfig};
use crate::context::DeployContext;
use crate::errors::{DeployError, Result};
use crate::inventory::{Host, InstanceDirectory};
use crate::proxy::Nginx;
use crate::registry::BuildRegistry;
use crate::remote::{HostConnector, RemoteExecutor};
use crate::supervisor::Supervisorctl;
use crate::tools::ToolRegistry;

pub struct Deployment<'a> {
    pub config: &'a ConfigFile,
    pub ctx: &'a DeployContext,
    pub directory: &'a dyn InstanceDirectory,
    pub connector: &'a dyn HostConnector,
    pub tools: &'a ToolRegistry,
}

impl<'a> Deployment<'a> {
    /// Run `command` on each targeted host, sequentially.
    pub async fn run_on_role(&self, command: &Command) -> Result<()> {
        let target = command.target();
        let role = self.config.role(&target.role)?;
        let hosts: Vec<Host> = self
            .directory
            .hosts_in_role(&role.name)
            .into_iter()
            .filter(|h| target.host.as_deref().is_none_or(|name| h.name == name))
            .collect();
        if hosts.is_empty() {
            return Err(DeployError::NoHostInRole(role.name.clone()));
        }

        for host in &hosts {
            info!(host = %host.name, role = %role.name, command = command.name(), "running");
            let exec = self.connector.connect(host, &role.user);
            match command {
                Command::Build(_) => {
                    self.build(host, role, exec).await?;
                }
                Command::Activate { force, .. } => {
                    self.activate(host, role, exec, *force).await?;
                }
                Command::Deactivate(_) => {
                    self.deactivate(host, role, exec).await?;
                }
                Command::Status(_) => self.status(host, exec).await?,
                Command::Provision(_) => self.provision(host, role, exec).await?,
            }
        }
        Ok(())
    }

    pub async fn build(
        &self,
        host: &Host,
        role: &RoleConfig,
        exec: Arc<dyn RemoteExecutor>,
    ) -> Result<String> {
        let spec = role.build.as_ref().ok_or_else(|| {
            DeployError::ConfigError(format!("role '{}' has no [build] section", role.name))
        })?;
        let pipeline = BuildPipeline::new(self.ctx, self.config, exec, self.directory, self.connector);
        let build = pipeline.run(spec).await?;
        self.directory
            .tag(host, &self.config.tags.last_good_build, &build)?;
        Ok(build)
    }

    pub async fn activate(
        &self,
        host: &Host,
        role: &RoleConfig,
        exec: Arc<dyn RemoteExecutor>,
        force: bool,
    ) -> Result<ActivationOutcome> {
        let mut spec = role.activate.clone().ok_or_else(|| {
            DeployError::ConfigError(format!("role '{}' has no [activate] section", role.name))
        })?;
        spec.force |= force;

        let supervisor = Supervisorctl::new(
            Arc::clone(&exec),
            &self.config.context.supervisor_include_conf,
            self.ctx.use_sudo,
        );
        let proxy = Nginx::new(
            Arc::clone(&exec),
            &self.config.context.nginx_include_conf,
            self.ctx.use_sudo,
        );
        let outcome = Activator::new(self.ctx, exec, &supervisor, &proxy)
            .activate(&spec)
            .await?;
        if let ActivationOutcome::Activated { build, .. } = &outcome {
            self.directory
                .tag(host, &self.config.tags.active_build, build)?;
        }
        Ok(outcome)
    }

    pub async fn deactivate(
        &self,
        host: &Host,
        role: &RoleConfig,
        exec: Arc<dyn RemoteExecutor>,
    ) -> Result<Option<String>> {
        let spec = role.activate.as_ref().ok_or_else(|| {
            DeployError::ConfigError(format!("role '{}' has no [activate] section", role.name))
        })?;
        let supervisor = Supervisorctl::new(
            Arc::clone(&exec),
            &self.config.context.supervisor_include_conf,
            self.ctx.use_sudo,
        );
        let proxy = Nginx::new(
            Arc::clone(&exec),
            &self.config.context.nginx_include_conf,
            self.ctx.use_sudo,
        );
        let previous = Activator::new(self.ctx, exec, &supervisor, &proxy)
            .deactivate(&spec.key)
            .await?;
        if previous.is_some() {
            self.directory
                .untag(host, &self.config.tags.active_build)?;
        }
        Ok(previous)
    }

    pub async fn status(&self, host: &Host, exec: Arc<dyn RemoteExecutor>) -> Result<()> {
        let registry = BuildRegistry::load(exec, self.ctx).await?;
        let tags = self.directory.tags(host)?;
        let report = serde_json::json!({
            "host": host.name,
            "role": host.role,
            "registry": registry.state(),
            "tags": tags,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    pub async fn provision(
        &self,
        host: &Host,
        role: &RoleConfig,
        exec: Arc<dyn RemoteExecutor>,
    ) -> Result<()> {
        if role.tools.is_empty() {
            warn!(host = %host.name, role = %role.name, "role lists no tools");
            return Ok(());
        }
        let report = self
            .tools
            .provision(exec.as_ref(), &role.tools, self.ctx.use_sudo)
            .await?;
        for (tool, result) in report {
            info!(host = %host.name, %tool, ?result, "provisioned");
        }
        Ok(())
    }
}
