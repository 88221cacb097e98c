// tests/local_executor.rs

use std::error::Error;

use tempfile::tempdir;

use cutover::errors::DeployError;
use cutover::remote::{LocalExecutor, RemoteCommand, RemoteExecutor, run_checked};
use cutover_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn render_scopes_directory_then_prefix() {
    let cmd = RemoteCommand::new("pip install --quiet .")
        .in_dir("/srv/shop/repos/api")
        .with_prefix(". /srv/shop/builds/b1/bin/activate");
    assert_eq!(
        cmd.render(),
        "cd /srv/shop/repos/api && . /srv/shop/builds/b1/bin/activate && pip install --quiet ."
    );

    assert_eq!(RemoteCommand::new("true").render(), "true");
}

#[test]
fn render_wraps_the_whole_line_in_sudo() {
    let cmd = RemoteCommand::new("nginx -s reload").in_dir("/etc/nginx").sudo(true);
    assert_eq!(
        cmd.render(),
        "sudo -n sh -c 'cd /etc/nginx && nginx -s reload'"
    );
}

#[tokio::test]
async fn local_commands_run_in_their_directory() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    std::fs::write(dir.path().join("marker.txt"), "hello")?;
    let exec = LocalExecutor::new();
    let path = dir.path().to_string_lossy().into_owned();

    let out = with_timeout(exec.run(&RemoteCommand::new("cat marker.txt").in_dir(&path))).await?;

    assert!(out.success);
    assert_eq!(out.stdout_trimmed(), "hello");
    Ok(())
}

#[tokio::test]
async fn failing_commands_are_reported_not_raised() -> TestResult {
    init_tracing();
    let exec = LocalExecutor::new();

    let out = with_timeout(exec.run(&RemoteCommand::new("echo oops >&2; exit 3"))).await?;
    assert!(!out.success);
    assert_eq!(out.exit_code, Some(3));
    assert_eq!(out.combined(), "oops");

    let err = with_timeout(run_checked(&exec, &RemoteCommand::new("exit 4"), "probing"))
        .await
        .expect_err("run_checked turns failures into errors");
    assert!(
        matches!(err, DeployError::RemoteCommand { ref step, exit_code: Some(4), .. } if step == "probing"),
        "got {err:?}"
    );
    Ok(())
}

#[tokio::test]
async fn put_file_creates_parent_directories() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let target = dir.path().join("nested/conf.d/app.conf");
    let exec = LocalExecutor::new();

    with_timeout(exec.put_file(b"server {}\n", &target.to_string_lossy(), false)).await?;

    assert_eq!(std::fs::read_to_string(&target)?, "server {}\n");
    Ok(())
}
