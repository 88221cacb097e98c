// src/build/pipeline.rs

//! Produces a new build on one host, either from source or by copying the
//! last good build of a peer role.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{ConfigFile, RepoConfig};
use crate::context::DeployContext;
use crate::errors::{DeployError, Result};
use crate::inventory::InstanceDirectory;
use crate::registry::BuildRegistry;
use crate::remote::probe::file_exists;
use crate::remote::{HostConnector, RemoteCommand, RemoteExecutor, quote, run_checked};

use super::spec::{BuildPlan, BuildSource, BuildSpec, CopyFromSpec, PostBuildCommand, TestPlan};
use super::{git, virtualenv};

/// Drives one build on the host behind `exec`.
pub struct BuildPipeline<'a> {
    ctx: &'a DeployContext,
    config: &'a ConfigFile,
    exec: Arc<dyn RemoteExecutor>,
    directory: &'a dyn InstanceDirectory,
    connector: &'a dyn HostConnector,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(
        ctx: &'a DeployContext,
        config: &'a ConfigFile,
        exec: Arc<dyn RemoteExecutor>,
        directory: &'a dyn InstanceDirectory,
        connector: &'a dyn HostConnector,
    ) -> Self {
        Self {
            ctx,
            config,
            exec,
            directory,
            connector,
        }
    }

    /// Run the whole pipeline and return the resulting build name.
    pub async fn run(&self, spec: &BuildSpec) -> Result<String> {
        let build = match &spec.source {
            BuildSource::Plan(plan) => self.build_from_source(plan).await?,
            BuildSource::CopyFrom(copy) => self.copy_from(copy).await?,
        };
        self.run_post_build(&build, &spec.post_build).await?;
        info!(host = self.exec.host(), %build, "build finished");
        Ok(build)
    }

    pub async fn build_from_source(&self, plan: &BuildPlan) -> Result<String> {
        if plan.repos.is_empty() {
            return Err(DeployError::halt(
                "build plan must list at least one repository",
            ));
        }
        let reference = plan
            .reference()
            .ok_or_else(|| DeployError::halt("build plan has no reference repository"))?;

        let mut repos: Vec<(&RepoConfig, String)> = Vec::with_capacity(plan.repos.len());
        for name in &plan.repos {
            let repo = self.repo(name)?;
            let path = git::ensure_checkout(self.exec.as_ref(), self.ctx, repo).await?;
            if plan.pull {
                git::pull(self.exec.as_ref(), &path).await?;
            }
            repos.push((repo, path));
        }

        let reference_path = self.ctx.repo_path(&self.repo(reference)?.dir());
        let commit = git::head_commit(self.exec.as_ref(), &reference_path).await?;

        let mut registry = BuildRegistry::load(Arc::clone(&self.exec), self.ctx).await?;
        let build = registry.next_build_name(&commit).await?;
        let env_dir = self.ctx.build_path(&build);
        info!(host = self.exec.host(), %build, reference, %commit, "building from source");

        let mkdir = RemoteCommand::new(format!("mkdir -p {}", quote(&self.ctx.builds_root())));
        run_checked(self.exec.as_ref(), &mkdir, "creating builds directory").await?;
        virtualenv::ensure(
            self.exec.as_ref(),
            &env_dir,
            plan.interpreter.as_deref(),
            plan.force_recreate,
        )
        .await?;

        for (repo, path) in &repos {
            self.install_repo(&env_dir, repo, path).await?;
        }

        if let Some(tests) = &plan.test_plan {
            self.run_tests(&env_dir, tests).await?;
        }

        registry.mark_last_good(&build).await?;

        if plan.tarball {
            self.create_tarball(&build).await?;
        }
        Ok(build)
    }

    pub async fn copy_from(&self, spec: &CopyFromSpec) -> Result<String> {
        let peer = self.directory.first_host_in_role(&spec.role)?;
        let peer_user = &self.config.role(&spec.role)?.user;
        let peer_exec = self.connector.connect(&peer, peer_user);

        let peer_registry = BuildRegistry::load(Arc::clone(&peer_exec), self.ctx).await?;
        let build = peer_registry.last().map(str::to_string).ok_or_else(|| {
            DeployError::halt(format!(
                "host '{}' in role '{}' has no last good build to copy",
                peer.name, spec.role
            ))
        })?;
        let tarball = self.ctx.build_path(&DeployContext::tarball_name(&build));
        if !file_exists(peer_exec.as_ref(), &tarball).await? {
            return Err(DeployError::halt(format!(
                "host '{}' has no archive {tarball} for build {build}",
                peer.name
            )));
        }
        info!(host = self.exec.host(), peer = %peer.name, %build, "copying build from peer");

        let builds_root = self.ctx.builds_root();
        let mkdir = RemoteCommand::new(format!("mkdir -p {}", quote(&builds_root)));
        run_checked(self.exec.as_ref(), &mkdir, "creating builds directory").await?;

        let mut scp = String::from("scp -o StrictHostKeyChecking=no");
        if let Some(key) = self.ctx.machine_key_path() {
            // `~` must stay unquoted to expand on the host.
            scp.push_str(&format!(" -i {key}"));
        }
        scp.push_str(&format!(
            " {} {}",
            quote(&format!("{peer_user}@{}:{tarball}", peer.private_address())),
            quote(&tarball)
        ));
        run_checked(self.exec.as_ref(), &RemoteCommand::new(scp), "copying build archive").await?;

        let untar = RemoteCommand::new(format!("tar -x --file={}", quote(&tarball))).in_dir(&builds_root);
        run_checked(self.exec.as_ref(), &untar, "extracting build archive").await?;

        if spec.delete_tar {
            let rm = RemoteCommand::new(format!("rm -f {}", quote(&tarball)));
            run_checked(self.exec.as_ref(), &rm, "deleting build archive").await?;
        }

        let mut registry = BuildRegistry::load(Arc::clone(&self.exec), self.ctx).await?;
        registry.mark_last_good(&build).await?;
        Ok(build)
    }

    fn repo(&self, name: &str) -> Result<&'a RepoConfig> {
        self.config
            .repos
            .get(name)
            .ok_or_else(|| DeployError::RepoNotFound(name.to_string()))
    }

    async fn install_repo(&self, env_dir: &str, repo: &RepoConfig, path: &str) -> Result<()> {
        let cmd = RemoteCommand::new(format!("pip install --quiet {}", quote(path)))
            .with_prefix(virtualenv::activate_prefix(env_dir));
        run_checked(
            self.exec.as_ref(),
            &cmd,
            &format!("installing package {}", repo.package_name()),
        )
        .await?;
        info!(host = self.exec.host(), package = %repo.package_name(), "installed package");
        Ok(())
    }

    async fn run_tests(&self, env_dir: &str, tests: &TestPlan) -> Result<()> {
        let dir = match &tests.repo {
            Some(name) => self.ctx.repo_path(&self.repo(name)?.dir()),
            None => env_dir.to_string(),
        };
        for command in &tests.commands {
            let cmd = RemoteCommand::new(command.clone())
                .in_dir(&dir)
                .with_prefix(virtualenv::activate_prefix(env_dir));
            run_checked(self.exec.as_ref(), &cmd, "running test plan").await?;
        }
        info!(host = self.exec.host(), count = tests.commands.len(), "test plan passed");
        Ok(())
    }

    async fn create_tarball(&self, build: &str) -> Result<()> {
        let tarball = DeployContext::tarball_name(build);
        let cmd = RemoteCommand::new(format!(
            "tar --create --gzip --format=ustar --owner=0 --group=0 --file={} {}",
            quote(&tarball),
            quote(build)
        ))
        .in_dir(self.ctx.builds_root());
        run_checked(self.exec.as_ref(), &cmd, "archiving build")
            .await
            .map_err(|err| {
                DeployError::halt(format!(
                    "{err}; the registry already names {build} as last good, \
                     but peers cannot copy it until a later build is archived"
                ))
            })?;
        info!(host = self.exec.host(), %tarball, "archived build");
        Ok(())
    }

    async fn run_post_build(&self, build: &str, commands: &[PostBuildCommand]) -> Result<()> {
        let env_dir = self.ctx.build_path(build);
        for post in commands {
            let cmd = RemoteCommand::new(post.command.clone())
                .in_dir(&env_dir)
                .with_prefix(virtualenv::activate_prefix(&env_dir))
                .sudo(post.sudo);
            debug!(host = self.exec.host(), command = %post.command, sudo = post.sudo, "post-build command");
            if post.ignore_fail {
                let out = self.exec.run(&cmd).await?;
                if !out.success {
                    warn!(
                        host = self.exec.host(),
                        command = %post.command,
                        output = %out.combined(),
                        "post-build command failed; ignoring"
                    );
                }
            } else {
                run_checked(self.exec.as_ref(), &cmd, "running post-build command").await?;
            }
        }
        Ok(())
    }
}
