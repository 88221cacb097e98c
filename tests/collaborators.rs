// tests/collaborators.rs

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use cutover::activation::backend::{default_workers, resolve_options, start_command};
use cutover::errors::DeployError;
use cutover::proxy::{Nginx, ReverseProxy, ServerConfig, StaticLocation, render_server};
use cutover::remote::CommandOutput;
use cutover::supervisor::{
    ProcessSupervisor, ProgramDefinition, Supervisorctl, parse_status_line, render_program,
};
use cutover_test_utils::builders::activation_spec;
use cutover_test_utils::fake_executor::FakeExecutor;
use cutover_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

const SUPERVISOR_CONF: &str = "/etc/supervisor/conf.d";
const NGINX_CONF: &str = "/etc/nginx/conf.d";

fn program() -> ProgramDefinition {
    ProgramDefinition {
        name: "shop_00002_abc_web".to_string(),
        command: "/srv/shop/builds/shop_00002_abc/bin/gunicorn --bind 127.0.0.1:9002 app:app"
            .to_string(),
        directory: "/srv/shop/builds/shop_00002_abc".to_string(),
        log_dir: "/srv/shop/logs/shop_00002_abc_web".to_string(),
    }
}

fn server() -> ServerConfig {
    ServerConfig {
        name: "shop_00002_abc_web".to_string(),
        listen: 8080,
        server_names: "shop.example.com".to_string(),
        upstream: "127.0.0.1:9002".to_string(),
        static_locations: vec![StaticLocation {
            url: "/static/".to_string(),
            path: "/srv/shop/builds/shop_00002_abc/static/".to_string(),
        }],
        log_dir: "/srv/shop/logs/shop_00002_abc_web".to_string(),
    }
}

#[test]
fn program_section_runs_unprivileged_with_restart() {
    let text = render_program(&program());

    assert!(text.starts_with("[program:shop_00002_abc_web]\n"));
    assert!(text.contains("\ncommand=/srv/shop/builds/shop_00002_abc/bin/gunicorn "));
    assert!(text.contains("\ndirectory=/srv/shop/builds/shop_00002_abc\n"));
    assert!(text.contains("\nuser=nobody\n"));
    assert!(text.contains("\nautorestart=true\n"));
    assert!(text.contains("\nstdout_logfile=/srv/shop/logs/shop_00002_abc_web/supervisord.log\n"));
    assert!(text.contains("\nredirect_stderr=true\n"));
}

#[test]
fn status_is_the_second_field() {
    assert_eq!(
        parse_status_line("shop_web   RUNNING   pid 4242, uptime 0:00:05\n").as_deref(),
        Some("RUNNING")
    );
    assert_eq!(
        parse_status_line("\nshop_web   BACKOFF   Exited too quickly\n").as_deref(),
        Some("BACKOFF")
    );
    assert_eq!(parse_status_line("shop_web: ERROR (no such process)"), None);
    assert_eq!(parse_status_line("unix:///var/run/supervisor.sock refused connection"), None);
    assert_eq!(parse_status_line(""), None);
}

#[tokio::test]
async fn write_program_creates_log_dir_and_conf_file() -> TestResult {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new("web-1"));
    let sup = Supervisorctl::new(exec.clone(), SUPERVISOR_CONF, true);

    sup.write_program(&program()).await?;

    let mkdir = exec.recorded().into_iter().next().ok_or("nothing ran")?;
    assert_eq!(mkdir.command, "mkdir -p /srv/shop/logs/shop_00002_abc_web");
    assert!(mkdir.sudo);
    let conf = exec
        .file("/etc/supervisor/conf.d/shop_00002_abc_web.conf")
        .ok_or("conf not written")?;
    assert_eq!(conf, render_program(&program()));
    Ok(())
}

#[tokio::test]
async fn start_rereads_then_adds() -> TestResult {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new("web-1"));
    let sup = Supervisorctl::new(exec.clone(), SUPERVISOR_CONF, false);

    sup.start("shop_00002_abc_web").await?;

    assert_eq!(
        exec.commands(),
        ["supervisorctl reread", "supervisorctl add shop_00002_abc_web"]
    );
    Ok(())
}

#[tokio::test]
async fn start_treats_error_output_as_failure() {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new("web-1"));
    exec.on(
        "supervisorctl add",
        CommandOutput::ok("ERROR (no such process)"),
    );
    let sup = Supervisorctl::new(exec.clone(), SUPERVISOR_CONF, false);

    let err = sup.start("prog").await.expect_err("ERROR output fails the start");
    assert!(matches!(err, DeployError::RemoteCommand { .. }), "got {err:?}");
}

#[tokio::test]
async fn status_reads_output_of_non_zero_exit() -> TestResult {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new("web-1"));
    exec.on(
        "supervisorctl status",
        CommandOutput {
            success: false,
            exit_code: Some(3),
            stdout: "prog   STARTING\n".to_string(),
            stderr: String::new(),
        },
    );
    let sup = Supervisorctl::new(exec, SUPERVISOR_CONF, false);

    assert_eq!(sup.status("prog").await?, "STARTING");
    Ok(())
}

#[tokio::test]
async fn unknown_status_is_an_error() {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new("web-1"));
    exec.on(
        "supervisorctl status",
        CommandOutput::ok("prog: ERROR (no such process)"),
    );
    let sup = Supervisorctl::new(exec, SUPERVISOR_CONF, false);

    assert!(sup.status("prog").await.is_err());
}

#[tokio::test]
async fn stop_and_remove_tolerates_unknown_programs() -> TestResult {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new("web-1"));
    exec.add_file("/etc/supervisor/conf.d/prog.conf", "[program:prog]");
    exec.on("supervisorctl stop", CommandOutput::failed(1, "prog: ERROR (not running)"));
    exec.on("supervisorctl remove", CommandOutput::failed(1, "ERROR (no such process)"));
    let sup = Supervisorctl::new(exec.clone(), SUPERVISOR_CONF, false);

    sup.stop_and_remove("prog").await?;

    assert!(!exec.has_file("/etc/supervisor/conf.d/prog.conf"));
    assert_eq!(exec.commands().last().map(String::as_str), Some("supervisorctl update"));
    Ok(())
}

#[test]
fn server_block_proxies_to_upstream_and_aliases_static_paths() {
    let text = render_server(&server());

    assert!(text.starts_with("server {\n"));
    assert!(text.contains("    listen 8080;\n"));
    assert!(text.contains("    server_name shop.example.com;\n"));
    assert!(text.contains("access_log /srv/shop/logs/shop_00002_abc_web/ngaccess.log;"));
    assert!(text.contains("error_log /srv/shop/logs/shop_00002_abc_web/ngerror.log;"));
    assert!(text.contains("proxy_pass http://127.0.0.1:9002;"));
    assert!(text.contains("proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;"));
    assert!(text.contains("    location /static/ {\n        alias /srv/shop/builds/shop_00002_abc/static/;\n"));
    assert!(text.ends_with("}\n"));
}

#[tokio::test]
async fn nginx_writes_deletes_and_reloads() -> TestResult {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new("web-1"));
    let nginx = Nginx::new(exec.clone(), NGINX_CONF, false);
    let path = "/etc/nginx/conf.d/shop_00002_abc_web.conf";

    nginx.write_server_config(&server()).await?;
    assert_eq!(exec.file(path), Some(render_server(&server())));

    nginx.reload().await?;
    nginx.delete_server_config("shop_00002_abc_web").await?;
    nginx.delete_server_config("never_written").await?;

    assert!(!exec.has_file(path));
    assert!(exec.commands().iter().any(|c| c == "nginx -s reload"));
    Ok(())
}

#[tokio::test]
async fn nginx_reload_failure_is_fatal() {
    init_tracing();
    let exec = Arc::new(FakeExecutor::new("web-1"));
    exec.on("nginx -s reload", CommandOutput::failed(1, "emerg: unknown directive"));
    let nginx = Nginx::new(exec, NGINX_CONF, false);

    let err = nginx.reload().await.expect_err("reload failure is reported");
    assert!(err.to_string().contains("unknown directive"), "got {err}");
}

#[test]
fn backend_options_fill_bind_workers_and_name() {
    let spec = activation_spec("web");
    let options = resolve_options(&spec.backend, "shop_00002_abc_web", 9002, Some(2));

    assert_eq!(options["bind"], "127.0.0.1:9002");
    assert_eq!(options["workers"], default_workers(2).to_string());
    assert_eq!(options["workers"], "5");
    assert_eq!(options["name"], "shop_00002_abc_web");
    assert!(!options.contains_key("log-level"));
}

#[test]
fn configured_options_win_except_bind() {
    let mut spec = activation_spec("web");
    spec.backend.options = BTreeMap::from([
        ("bind".to_string(), "0.0.0.0:80".to_string()),
        ("workers".to_string(), "3".to_string()),
        ("log-level".to_string(), "warning".to_string()),
    ]);
    spec.backend.debug = true;

    let options = resolve_options(&spec.backend, "prog", 9100, None);

    assert_eq!(options["bind"], "127.0.0.1:9100");
    assert_eq!(options["workers"], "3");
    assert_eq!(options["log-level"], "warning");
}

#[test]
fn debug_raises_log_level() {
    let mut spec = activation_spec("web");
    spec.backend.debug = true;

    let options = resolve_options(&spec.backend, "prog", 9100, None);

    assert_eq!(options["log-level"], "debug");
    assert!(!options.contains_key("workers"), "no CPU count, no default");
}

#[test]
fn start_command_runs_the_build_script() {
    let spec = activation_spec("web");
    let cmd = start_command("/srv/shop/builds/b1", &spec.backend, "b1_web", 9002, Some(1));

    assert!(cmd.starts_with("/srv/shop/builds/b1/bin/gunicorn --bind "));
    assert!(cmd.contains("--workers 3"));
    assert!(cmd.contains("--name b1_web"));
    assert!(cmd.trim_end_matches('\'').ends_with("app:app"));
}
