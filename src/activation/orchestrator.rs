// src/activation/orchestrator.rs

//! Blue/green cutover for one key on one host.
//!
//! ```text
//! Idle -> NewBackendStarting -> HealthChecking -> ProxySwitching
//!      -> OldBackendRetiring -> Active
//! ```
//!
//! A failure while starting, health-checking or switching the proxy removes
//! the new backend and leaves the registry untouched (`RolledBack`). A forced
//! restart of the active build is the exception: its live program is already
//! gone, so the key's active build is cleared instead.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::{DeployContext, join};
use crate::errors::{DeployError, Result};
use crate::proxy::{ReverseProxy, ServerConfig, StaticLocation};
use crate::readiness::wait_until_ready;
use crate::registry::{ActiveDeployment, BuildRegistry, program_name};
use crate::remote::RemoteExecutor;
use crate::remote::probe::{cpu_count, http_status, unused_port};
use crate::supervisor::{ProcessSupervisor, ProgramDefinition};
use crate::types::is_valid_name;

use super::backend::{BIND_HOST, start_command};
use super::best_effort::BestEffort;
use super::spec::{ActivationSpec, BackendSpec, ProxySpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    Idle,
    NewBackendStarting,
    HealthChecking,
    ProxySwitching,
    OldBackendRetiring,
    Active,
    RolledBack,
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivationState::Idle => "idle",
            ActivationState::NewBackendStarting => "new-backend-starting",
            ActivationState::HealthChecking => "health-checking",
            ActivationState::ProxySwitching => "proxy-switching",
            ActivationState::OldBackendRetiring => "old-backend-retiring",
            ActivationState::Active => "active",
            ActivationState::RolledBack => "rolled-back",
        };
        f.write_str(s)
    }
}

/// Result of [`Activator::activate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// The last good build already serves this key.
    Unchanged,
    Activated {
        build: String,
        port: u16,
        /// Build that served the key before, if any.
        previous: Option<String>,
    },
}

/// Progress of the proxy switch, needed to undo it.
#[derive(Debug, Default)]
struct SwitchProgress {
    new_written: bool,
    old_deleted: bool,
}

pub struct Activator<'a> {
    ctx: &'a DeployContext,
    exec: Arc<dyn RemoteExecutor>,
    supervisor: &'a dyn ProcessSupervisor,
    proxy: &'a dyn ReverseProxy,
}

impl<'a> Activator<'a> {
    pub fn new(
        ctx: &'a DeployContext,
        exec: Arc<dyn RemoteExecutor>,
        supervisor: &'a dyn ProcessSupervisor,
        proxy: &'a dyn ReverseProxy,
    ) -> Self {
        Self {
            ctx,
            exec,
            supervisor,
            proxy,
        }
    }

    /// Switch `spec.key` over to the registry's last good build.
    pub async fn activate(&self, spec: &ActivationSpec) -> Result<ActivationOutcome> {
        let key = spec.key.as_str();
        if !is_valid_name(key) {
            return Err(DeployError::ConfigError(format!(
                "activation key '{key}' may only contain letters, digits, '_' and '-'"
            )));
        }

        let mut registry = BuildRegistry::load(Arc::clone(&self.exec), self.ctx).await?;
        let old = registry.active_of(key);
        let new_build = registry.last().map(str::to_string).ok_or_else(|| {
            DeployError::halt(format!(
                "nothing to activate for key '{key}' on {}: no last good build",
                self.exec.host()
            ))
        })?;

        if !spec.force && old.build.as_deref() == Some(new_build.as_str()) {
            info!(host = self.exec.host(), key, build = %new_build, "build already active; nothing to do");
            return Ok(ActivationOutcome::Unchanged);
        }

        let program = program_name(&new_build, key);
        let mut old_program = old.build.as_deref().map(|b| program_name(b, key));

        let mut state = ActivationState::Idle;
        self.enter(&mut state, ActivationState::NewBackendStarting, key);

        let port = unused_port(self.exec.as_ref()).await?;
        let cpus = if spec.backend.options.contains_key("workers") {
            None
        } else {
            Some(cpu_count(self.exec.as_ref()).await?)
        };
        let build_dir = self.ctx.build_path(&new_build);
        let def = ProgramDefinition {
            name: program.clone(),
            command: start_command(&build_dir, &spec.backend, &program, port, cpus),
            directory: build_dir,
            log_dir: join(&self.ctx.logs_root(), &program),
        };

        // Forcing the active build again reuses its program name, so the live
        // program has to go before the new one can be registered. From here on
        // a failure leaves nothing serving the key.
        let restarting_live = old_program.as_deref() == Some(program.as_str());
        if restarting_live {
            let mut cleanup = BestEffort::new();
            cleanup
                .attempt("stopping program for forced restart", self.supervisor.stop_and_remove(&program))
                .await;
            old_program = None;
        }

        if let Err(err) = self.bring_up(&def, port, &spec.backend, &mut state, key).await {
            self.roll_back(&mut state, key, &program, None, &SwitchProgress::default())
                .await;
            if restarting_live {
                self.forget_active(&mut registry, key).await;
            }
            return Err(err);
        }

        self.enter(&mut state, ActivationState::ProxySwitching, key);
        let server = self.server_config(&new_build, &program, port, &spec.proxy);
        let old_server = match (&old.build, &old_program) {
            (Some(build), Some(name)) => Some(self.server_config(build, name, old.port, &spec.proxy)),
            _ => None,
        };
        let mut progress = SwitchProgress::default();
        if let Err(err) = self
            .switch_proxy(&server, old_program.as_deref(), &mut progress)
            .await
        {
            self.roll_back(&mut state, key, &program, old_server.as_ref(), &progress)
                .await;
            if restarting_live {
                self.forget_active(&mut registry, key).await;
            }
            return Err(err);
        }

        self.enter(&mut state, ActivationState::OldBackendRetiring, key);
        if let Some(old_program) = &old_program {
            let mut retire = BestEffort::new();
            retire
                .attempt("retiring old backend", self.supervisor.stop_and_remove(old_program))
                .await;
        }

        *registry.active(key) = ActiveDeployment {
            build: Some(new_build.clone()),
            port,
        };
        registry.save().await?;
        self.enter(&mut state, ActivationState::Active, key);
        info!(host = self.exec.host(), key, build = %new_build, port, previous = ?old.build, "activation complete");

        Ok(ActivationOutcome::Activated {
            build: new_build,
            port,
            previous: old.build,
        })
    }

    /// Take `key` out of service. Cleanup failures are logged; the registry
    /// entry is cleared regardless. Returns the build that was active.
    pub async fn deactivate(&self, key: &str) -> Result<Option<String>> {
        let mut registry = BuildRegistry::load(Arc::clone(&self.exec), self.ctx).await?;
        let Some(build) = registry.active_of(key).build else {
            info!(host = self.exec.host(), key, "nothing active; nothing to deactivate");
            return Ok(None);
        };
        let program = program_name(&build, key);

        let mut cleanup = BestEffort::new();
        if cleanup
            .attempt("deleting proxy config", self.proxy.delete_server_config(&program))
            .await
        {
            cleanup.attempt("reloading proxy", self.proxy.reload()).await;
        }
        cleanup
            .attempt("stopping backend", self.supervisor.stop_and_remove(&program))
            .await;

        registry.active(key).build = None;
        registry.save().await?;

        if cleanup.is_clean() {
            info!(host = self.exec.host(), key, %build, "deactivated");
        } else {
            warn!(
                host = self.exec.host(),
                key,
                %build,
                failures = cleanup.failures().len(),
                "deactivated with cleanup failures"
            );
        }
        Ok(Some(build))
    }

    fn enter(&self, state: &mut ActivationState, next: ActivationState, key: &str) {
        debug!(host = self.exec.host(), key, from = %state, to = %next, "activation state");
        *state = next;
    }

    async fn bring_up(
        &self,
        def: &ProgramDefinition,
        port: u16,
        backend: &BackendSpec,
        state: &mut ActivationState,
        key: &str,
    ) -> Result<()> {
        self.supervisor.write_program(def).await?;
        self.supervisor.start(&def.name).await?;

        self.enter(state, ActivationState::HealthChecking, key);
        let readiness = wait_until_ready(
            self.supervisor,
            &def.name,
            self.ctx.ready_tries,
            self.ctx.ready_wait,
        )
        .await;
        if !readiness.is_ready() {
            return Err(DeployError::HealthCheck {
                program: def.name.clone(),
                reason: readiness.describe(),
            });
        }

        if let Some(path) = &backend.http_test_path {
            let url = format!("http://{BIND_HOST}:{port}{path}");
            let status = http_status(self.exec.as_ref(), &url).await?;
            if !(200..500).contains(&status) {
                return Err(DeployError::HealthCheck {
                    program: def.name.clone(),
                    reason: format!("GET {url} returned HTTP {status}"),
                });
            }
            debug!(program = %def.name, %url, status, "HTTP probe passed");
        }
        Ok(())
    }

    async fn switch_proxy(
        &self,
        server: &ServerConfig,
        old_program: Option<&str>,
        progress: &mut SwitchProgress,
    ) -> Result<()> {
        self.proxy.write_server_config(server).await?;
        progress.new_written = true;
        if let Some(old) = old_program {
            self.proxy.delete_server_config(old).await?;
            progress.old_deleted = true;
        }
        self.proxy.reload().await
    }

    async fn roll_back(
        &self,
        state: &mut ActivationState,
        key: &str,
        program: &str,
        old_server: Option<&ServerConfig>,
        progress: &SwitchProgress,
    ) {
        let failed_in = *state;
        self.enter(state, ActivationState::RolledBack, key);

        let mut cleanup = BestEffort::new();
        cleanup
            .attempt("removing new backend", self.supervisor.stop_and_remove(program))
            .await;
        if progress.new_written {
            cleanup
                .attempt("deleting new proxy config", self.proxy.delete_server_config(program))
                .await;
        }
        if progress.old_deleted {
            if let Some(old) = old_server {
                cleanup
                    .attempt("restoring old proxy config", self.proxy.write_server_config(old))
                    .await;
            }
        }
        if progress.new_written {
            cleanup.attempt("reloading proxy", self.proxy.reload()).await;
        }
        warn!(
            host = self.exec.host(),
            key,
            program,
            %failed_in,
            cleanup_failures = cleanup.failures().len(),
            "activation rolled back"
        );
    }

    /// Clear the key's active build after its live program was torn down.
    async fn forget_active(&self, registry: &mut BuildRegistry, key: &str) {
        registry.active(key).build = None;
        let mut cleanup = BestEffort::new();
        if cleanup.attempt("clearing active build", registry.save()).await {
            warn!(host = self.exec.host(), key, "forced restart failed; key has no active build");
        }
    }

    fn server_config(&self, build: &str, program: &str, port: u16, proxy: &ProxySpec) -> ServerConfig {
        let build_dir = self.ctx.build_path(build);
        let static_base = match &proxy.static_root {
            Some(root) => join(&build_dir, root),
            None => build_dir,
        };
        ServerConfig {
            name: program.to_string(),
            listen: proxy.listen,
            server_names: proxy.server_names.clone(),
            upstream: format!("{BIND_HOST}:{port}"),
            static_locations: proxy
                .static_files
                .iter()
                .map(|m| StaticLocation {
                    url: m.url.clone(),
                    path: join(&static_base, &m.local),
                })
                .collect(),
            log_dir: proxy
                .log_dir
                .clone()
                .unwrap_or_else(|| join(&self.ctx.logs_root(), program)),
        }
    }
}
