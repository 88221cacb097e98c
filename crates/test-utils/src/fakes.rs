use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

use cutover::errors::{DeployError, Result};
use cutover::proxy::{ReverseProxy, ServerConfig};
use cutover::remote::BoxFuture;
use cutover::supervisor::{ProcessSupervisor, ProgramDefinition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorCall {
    WriteProgram(String),
    Start(String),
    StopAndRemove(String),
    Status(String),
    Reload,
}

/// In-memory supervisor with scripted statuses and failure injection.
///
/// Statuses are served from a script shared by all programs; once it runs
/// out, the last entry repeats. The default script is `["RUNNING"]`.
#[derive(Default)]
pub struct FakeSupervisor {
    state: Mutex<SupervisorState>,
}

#[derive(Default)]
struct SupervisorState {
    calls: Vec<SupervisorCall>,
    programs: BTreeMap<String, ProgramDefinition>,
    running: BTreeSet<String>,
    statuses: VecDeque<String>,
    last_status: Option<String>,
    status_unavailable: bool,
    fail_write: bool,
    fail_start: bool,
    fail_stop: BTreeSet<String>,
}

impl FakeSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statuses(statuses: &[&str]) -> Self {
        let sup = Self::new();
        sup.lock().statuses = statuses.iter().map(|s| s.to_string()).collect();
        sup
    }

    /// Register `name` as an already running program.
    pub fn preload(&self, name: &str) {
        let mut state = self.lock();
        state.programs.insert(
            name.to_string(),
            ProgramDefinition {
                name: name.to_string(),
                command: String::new(),
                directory: String::new(),
                log_dir: String::new(),
            },
        );
        state.running.insert(name.to_string());
    }

    pub fn status_unavailable(&self) {
        self.lock().status_unavailable = true;
    }

    pub fn fail_write(&self) {
        self.lock().fail_write = true;
    }

    pub fn fail_start(&self) {
        self.lock().fail_start = true;
    }

    pub fn fail_stop(&self, name: &str) {
        self.lock().fail_stop.insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<SupervisorCall> {
        self.lock().calls.clone()
    }

    pub fn status_polls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SupervisorCall::Status(_)))
            .count()
    }

    pub fn program(&self, name: &str) -> Option<ProgramDefinition> {
        self.lock().programs.get(name).cloned()
    }

    pub fn has_program(&self, name: &str) -> bool {
        self.lock().programs.contains_key(name)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.lock().running.contains(name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn injected(step: &str) -> DeployError {
    DeployError::RemoteCommand {
        step: step.to_string(),
        command: "fake".to_string(),
        exit_code: Some(1),
        output: "injected failure".to_string(),
    }
}

impl ProcessSupervisor for FakeSupervisor {
    fn write_program<'a>(&'a self, def: &'a ProgramDefinition) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(SupervisorCall::WriteProgram(def.name.clone()));
            if state.fail_write {
                return Err(injected("writing supervisor program"));
            }
            state.programs.insert(def.name.clone(), def.clone());
            Ok(())
        })
    }

    fn start<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(SupervisorCall::Start(name.to_string()));
            if state.fail_start {
                return Err(injected("adding supervisor program"));
            }
            state.running.insert(name.to_string());
            Ok(())
        })
    }

    fn stop_and_remove<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(SupervisorCall::StopAndRemove(name.to_string()));
            if state.fail_stop.contains(name) {
                return Err(injected("stopping supervisor program"));
            }
            state.programs.remove(name);
            state.running.remove(name);
            Ok(())
        })
    }

    fn status<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(SupervisorCall::Status(name.to_string()));
            if state.status_unavailable {
                return Err(DeployError::halt("supervisorctl unreachable"));
            }
            let status = match state.statuses.pop_front() {
                Some(s) => s,
                None => state.last_status.clone().unwrap_or_else(|| "RUNNING".to_string()),
            };
            state.last_status = Some(status.clone());
            Ok(status)
        })
    }

    fn reload(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.lock().calls.push(SupervisorCall::Reload);
            Ok(())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyCall {
    Write(String),
    Delete(String),
    Reload,
}

/// In-memory reverse proxy with failure injection.
#[derive(Default)]
pub struct FakeProxy {
    state: Mutex<ProxyState>,
}

#[derive(Default)]
struct ProxyState {
    calls: Vec<ProxyCall>,
    configs: BTreeMap<String, ServerConfig>,
    fail_write_for: BTreeSet<String>,
    fail_delete: bool,
    fail_reload: bool,
}

impl FakeProxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing server config without recording a call.
    pub fn preload(&self, cfg: ServerConfig) {
        self.lock().configs.insert(cfg.name.clone(), cfg);
    }

    pub fn fail_write_for(&self, name: &str) {
        self.lock().fail_write_for.insert(name.to_string());
    }

    pub fn fail_delete(&self) {
        self.lock().fail_delete = true;
    }

    pub fn fail_reload(&self) {
        self.lock().fail_reload = true;
    }

    pub fn calls(&self) -> Vec<ProxyCall> {
        self.lock().calls.clone()
    }

    pub fn config(&self, name: &str) -> Option<ServerConfig> {
        self.lock().configs.get(name).cloned()
    }

    pub fn config_names(&self) -> Vec<String> {
        self.lock().configs.keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProxyState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ReverseProxy for FakeProxy {
    fn write_server_config<'a>(&'a self, cfg: &'a ServerConfig) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(ProxyCall::Write(cfg.name.clone()));
            if state.fail_write_for.contains(&cfg.name) {
                return Err(injected("writing proxy config"));
            }
            state.configs.insert(cfg.name.clone(), cfg.clone());
            Ok(())
        })
    }

    fn delete_server_config<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(ProxyCall::Delete(name.to_string()));
            if state.fail_delete {
                return Err(injected("deleting proxy config"));
            }
            state.configs.remove(name);
            Ok(())
        })
    }

    fn reload(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(ProxyCall::Reload);
            if state.fail_reload {
                return Err(injected("reloading nginx"));
            }
            Ok(())
        })
    }
}
