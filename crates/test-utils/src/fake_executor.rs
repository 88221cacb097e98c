use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use cutover::errors::{DeployError, Result};
use cutover::inventory::Host;
use cutover::remote::{BoxFuture, CommandOutput, RemoteCommand, RemoteExecutor, HostConnector};

/// A scripted, in-memory stand-in for a host.
///
/// - every `run` is recorded (the bare command, without sudo/cwd wrapping);
/// - commands matching a rule added with [`FakeExecutor::on`] get the
///   scripted output (first matching rule wins);
/// - otherwise `test -f`, `test -d`, `cat`, `mv -f`, `rm -f` and `mkdir -p`
///   are emulated over an in-memory file map, and everything else succeeds
///   with empty output.
#[derive(Default)]
pub struct FakeExecutor {
    host: String,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
    rules: Vec<(String, CommandOutput)>,
    commands: Vec<RemoteCommand>,
    puts: Vec<String>,
    failing_puts: Vec<String>,
}

impl FakeExecutor {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    /// A host answering the probes activation needs: free port `port`,
    /// 2 CPUs, and HTTP 200 from curl.
    pub fn with_probes(host: &str, port: u16) -> Self {
        let exec = Self::new(host);
        exec.on("python3 -c", CommandOutput::ok(format!("{port}\n")));
        exec.on("nproc", CommandOutput::ok("2\n"));
        exec.on("curl ", CommandOutput::ok("200"));
        exec
    }

    /// Script the output of commands containing `pattern`.
    pub fn on(&self, pattern: &str, output: CommandOutput) {
        self.lock().rules.push((pattern.to_string(), output));
    }

    /// Make `put_file` fail for paths containing `pattern`.
    pub fn fail_put(&self, pattern: &str) {
        self.lock().failing_puts.push(pattern.to_string());
    }

    pub fn add_file(&self, path: &str, content: &str) {
        self.lock().files.insert(path.to_string(), content.to_string());
    }

    pub fn add_dir(&self, path: &str) {
        self.lock().dirs.insert(path.trim_end_matches('/').to_string());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.lock().files.get(path).cloned()
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.lock().files.contains_key(path)
    }

    /// Bare command strings in execution order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.iter().map(|c| c.command.clone()).collect()
    }

    /// Full recorded commands, including sudo/cwd/prefix.
    pub fn recorded(&self) -> Vec<RemoteCommand> {
        self.lock().commands.clone()
    }

    /// Paths written with `put_file`, in order.
    pub fn puts(&self) -> Vec<String> {
        self.lock().puts.clone()
    }

    /// Position of the first command containing `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(pattern))
    }

    /// Commands that are not plain reads (`test`, `cat`).
    pub fn mutating_commands(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| !c.starts_with("test ") && !c.starts_with("cat "))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emulate(state: &mut State, command: &str) -> CommandOutput {
        let args: Vec<String> = command
            .split_whitespace()
            .map(|a| a.trim_matches('\'').to_string())
            .collect();
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();

        match argv.as_slice() {
            ["test", "-f", path] => exit(state.files.contains_key(*path)),
            ["test", "-d", path] => {
                let prefix = format!("{path}/");
                exit(
                    state.dirs.contains(*path)
                        || state.files.keys().any(|f| f.starts_with(&prefix)),
                )
            }
            ["cat", path] => match state.files.get(*path) {
                Some(content) => CommandOutput::ok(content.clone()),
                None => CommandOutput::failed(1, format!("cat: {path}: No such file or directory")),
            },
            ["mv", "-f", from, to] => match state.files.remove(*from) {
                Some(content) => {
                    state.files.insert(to.to_string(), content);
                    CommandOutput::ok("")
                }
                None => CommandOutput::failed(1, format!("mv: cannot stat '{from}'")),
            },
            ["rm", "-f", path] => {
                state.files.remove(*path);
                CommandOutput::ok("")
            }
            ["mkdir", "-p", path] => {
                state.dirs.insert(path.trim_end_matches('/').to_string());
                CommandOutput::ok("")
            }
            _ => CommandOutput::ok(""),
        }
    }
}

fn exit(success: bool) -> CommandOutput {
    if success {
        CommandOutput::ok("")
    } else {
        CommandOutput::failed(1, "")
    }
}

impl RemoteExecutor for FakeExecutor {
    fn host(&self) -> &str {
        &self.host
    }

    fn run<'a>(&'a self, cmd: &'a RemoteCommand) -> BoxFuture<'a, Result<CommandOutput>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.commands.push(cmd.clone());
            let scripted = state
                .rules
                .iter()
                .find(|(pattern, _)| cmd.command.contains(pattern.as_str()))
                .map(|(_, out)| out.clone());
            Ok(match scripted {
                Some(out) => out,
                None => Self::emulate(&mut state, &cmd.command),
            })
        })
    }

    fn put_file<'a>(
        &'a self,
        content: &'a [u8],
        remote_path: &'a str,
        _use_sudo: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.lock();
            if state.failing_puts.iter().any(|p| remote_path.contains(p.as_str())) {
                return Err(DeployError::RemoteCommand {
                    step: format!("writing file {remote_path}"),
                    command: "cat >".to_string(),
                    exit_code: Some(1),
                    output: "injected failure".to_string(),
                });
            }
            state.puts.push(remote_path.to_string());
            state
                .files
                .insert(remote_path.to_string(), String::from_utf8_lossy(content).into_owned());
            Ok(())
        })
    }
}

/// Connector handing out pre-registered fake executors by host name.
#[derive(Default)]
pub struct FakeConnector {
    hosts: BTreeMap<String, Arc<FakeExecutor>>,
    connections: Mutex<Vec<(String, String)>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, name: &str, exec: Arc<FakeExecutor>) -> Self {
        self.hosts.insert(name.to_string(), exec);
        self
    }

    /// `(host, user)` pairs in connection order.
    pub fn connections(&self) -> Vec<(String, String)> {
        self.connections.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl HostConnector for FakeConnector {
    fn connect(&self, host: &Host, user: &str) -> Arc<dyn RemoteExecutor> {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((host.name.clone(), user.to_string()));
        match self.hosts.get(&host.name) {
            Some(exec) => Arc::clone(exec) as Arc<dyn RemoteExecutor>,
            None => Arc::new(FakeExecutor::new(&host.name)),
        }
    }
}
