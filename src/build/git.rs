// src/build/git.rs

//! Source checkout helpers.

use tracing::info;

use crate::config::RepoConfig;
use crate::context::DeployContext;
use crate::errors::{DeployError, Result};
use crate::remote::probe::dir_exists;
use crate::remote::{RemoteCommand, RemoteExecutor, quote, run_checked};

/// Clone `repo` under the repos root unless its directory already exists.
/// Returns the checkout path.
pub async fn ensure_checkout(
    exec: &dyn RemoteExecutor,
    ctx: &DeployContext,
    repo: &RepoConfig,
) -> Result<String> {
    let dir = repo.dir();
    let path = ctx.repo_path(&dir);
    if dir_exists(exec, &path).await? {
        return Ok(path);
    }

    let root = ctx.repos_root();
    let mkdir = RemoteCommand::new(format!("mkdir -p {}", quote(&root)));
    run_checked(exec, &mkdir, "creating repos directory").await?;

    let clone = RemoteCommand::new(format!("git clone {} {}", quote(&repo.url), quote(&dir))).in_dir(root);
    run_checked(exec, &clone, &format!("cloning {}", repo.url)).await?;
    info!(host = exec.host(), url = %repo.url, %path, "cloned repository");
    Ok(path)
}

pub async fn pull(exec: &dyn RemoteExecutor, repo_path: &str) -> Result<()> {
    let cmd = RemoteCommand::new("git pull").in_dir(repo_path);
    run_checked(exec, &cmd, &format!("pulling {repo_path}")).await?;
    info!(host = exec.host(), repo = repo_path, "pulled repository");
    Ok(())
}

/// Abbreviated hash of the checked-out commit.
pub async fn head_commit(exec: &dyn RemoteExecutor, repo_path: &str) -> Result<String> {
    let cmd = RemoteCommand::new("git log -1 --pretty=format:%h").in_dir(repo_path);
    let out = run_checked(exec, &cmd, &format!("reading head commit of {repo_path}")).await?;
    let commit = out.stdout_trimmed();
    if commit.is_empty() {
        return Err(DeployError::halt(format!(
            "repository {repo_path} has no commits"
        )));
    }
    Ok(commit.to_string())
}
