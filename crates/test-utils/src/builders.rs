use std::collections::BTreeMap;
use std::time::Duration;

use cutover::activation::{ActivationSpec, BackendSpec, ProxySpec};
use cutover::build::{BuildPlan, CopyFromSpec, PostBuildCommand};
use cutover::config::{ConfigFile, RawBuildSection, RawConfigFile, RawRoleConfig, RepoConfig};
use cutover::context::DeployContext;
use cutover::inventory::{Host, Transport};

/// A context rooted at `/srv` with fast readiness polling and no sudo.
pub fn test_context(name: &str) -> DeployContext {
    DeployContext {
        name: name.to_string(),
        deploy_root: "/srv".to_string(),
        builds_dir: "builds".to_string(),
        repos_dir: "repos".to_string(),
        machine_key: None,
        use_sudo: false,
        ready_tries: 3,
        ready_wait: Duration::from_millis(1),
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(context: &str) -> Self {
        let raw: RawConfigFile = toml::from_str(&format!(
            "[context]\nname = \"{context}\"\ndeploy_root = \"/srv\"\nuse_sudo = false\n"
        ))
        .expect("minimal config parses");
        Self { config: raw }
    }

    pub fn with_repo(mut self, name: &str, url: &str) -> Self {
        self.config.repos.insert(
            name.to_string(),
            RepoConfig {
                url: url.to_string(),
                dir: None,
                package_name: None,
            },
        );
        self
    }

    pub fn with_role(mut self, name: &str, user: &str) -> Self {
        self.config.roles.insert(
            name.to_string(),
            RawRoleConfig {
                user: user.to_string(),
                tools: vec![],
                build: None,
                activate: None,
            },
        );
        self
    }

    pub fn with_host(mut self, name: &str, role: &str) -> Self {
        self.config.hosts.push(Host {
            name: name.to_string(),
            address: format!("{name}.example.com"),
            private_address: Some(format!("10.0.0.{}", self.config.hosts.len() + 1)),
            role: role.to_string(),
            transport: Transport::Ssh,
        });
        self
    }

    pub fn with_plan(mut self, role: &str, plan: BuildPlan) -> Self {
        self.build_section(role).plan = Some(plan);
        self
    }

    pub fn with_copy_from(mut self, role: &str, from: &str) -> Self {
        self.build_section(role).copy_from = Some(CopyFromSpec {
            role: from.to_string(),
            delete_tar: true,
        });
        self
    }

    pub fn with_post_build(mut self, role: &str, command: &str, ignore_fail: bool) -> Self {
        self.build_section(role).post_build.push(PostBuildCommand {
            command: command.to_string(),
            sudo: false,
            ignore_fail,
        });
        self
    }

    pub fn with_activation(mut self, role: &str, spec: ActivationSpec) -> Self {
        self.role(role).activate = Some(spec);
        self
    }

    pub fn with_machine_key(mut self, key: &str) -> Self {
        self.config.context.machine_key = Some(key.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    fn role(&mut self, role: &str) -> &mut RawRoleConfig {
        self.config
            .roles
            .get_mut(role)
            .expect("with_role must be called first")
    }

    fn build_section(&mut self, role: &str) -> &mut RawBuildSection {
        self.role(role).build.get_or_insert_with(RawBuildSection::default)
    }
}

/// A plan building `repos` in order.
pub fn plan(repos: &[&str]) -> BuildPlan {
    BuildPlan {
        repos: repos.iter().map(|r| r.to_string()).collect(),
        ..BuildPlan::default()
    }
}

/// Activation spec for `key` serving `app:app` with default proxy settings.
pub fn activation_spec(key: &str) -> ActivationSpec {
    ActivationSpec {
        key: key.to_string(),
        force: false,
        backend: BackendSpec {
            script: "gunicorn".to_string(),
            app_module: "app:app".to_string(),
            options: BTreeMap::new(),
            http_test_path: None,
            debug: false,
        },
        proxy: ProxySpec::default(),
    }
}
