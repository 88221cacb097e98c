// src/build/spec.rs

//! Build request types, as declared under `[roles.<name>.build]`.

use serde::Deserialize;

/// A validated build request: exactly one source plus post-build commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    pub source: BuildSource,
    pub post_build: Vec<PostBuildCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildSource {
    /// Build from the role's source repositories.
    Plan(BuildPlan),
    /// Replicate the last-known-good build of another role's host.
    CopyFrom(CopyFromSpec),
}

/// `[roles.<name>.build.plan]`
///
/// ```toml
/// [roles.web.build.plan]
/// repos = ["api", "common"]
/// reference_repo = "api"
/// interpreter = "python3.11"
/// tarball = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BuildPlan {
    /// Repository names (keys of `[repos.<name>]`), installed in this order.
    #[serde(default)]
    pub repos: Vec<String>,

    /// Repository whose head commit names the build. Defaults to the first
    /// entry of `repos`.
    #[serde(default)]
    pub reference_repo: Option<String>,

    /// Interpreter used to create the build environment.
    #[serde(default)]
    pub interpreter: Option<String>,

    #[serde(default)]
    pub test_plan: Option<TestPlan>,

    /// Archive the finished environment so peers can `copy_from` it.
    #[serde(default)]
    pub tarball: bool,

    /// Run `git pull` in every listed repository before building.
    #[serde(default)]
    pub pull: bool,

    /// Recreate the build environment even if a valid one exists.
    #[serde(default)]
    pub force_recreate: bool,
}

impl BuildPlan {
    /// The repository that names the build.
    pub fn reference(&self) -> Option<&str> {
        self.reference_repo
            .as_deref()
            .or_else(|| self.repos.first().map(String::as_str))
    }
}

/// Commands run inside the new environment after all packages installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TestPlan {
    #[serde(default)]
    pub commands: Vec<String>,

    /// Directory (relative to the repos root) to run the commands in.
    #[serde(default)]
    pub repo: Option<String>,
}

/// `[roles.<name>.build.copy_from]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CopyFromSpec {
    /// Role whose first host provides the build.
    pub role: String,

    #[serde(default = "default_delete_tar")]
    pub delete_tar: bool,
}

fn default_delete_tar() -> bool {
    true
}

/// One `[[roles.<name>.build.post_build]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostBuildCommand {
    pub command: String,

    #[serde(default)]
    pub sudo: bool,

    /// Log and continue when the command fails.
    #[serde(default)]
    pub ignore_fail: bool,
}
