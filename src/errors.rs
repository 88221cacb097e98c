// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Every variant here is *fatal*: it aborts the operation that produced it.
//! Failures that should merely be logged go through
//! [`crate::activation::BestEffort`] instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A remote command exited unsuccessfully.
    #[error("{step} failed: `{command}` (exit code {exit_code:?}): {output}")]
    RemoteCommand {
        step: String,
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// The remote transport itself failed (ssh could not be spawned, etc).
    #[error("transport error while {step}: {source}")]
    Transport {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("registry file {path} is unreadable or malformed: {reason}")]
    RegistryCorrupt { path: String, reason: String },

    #[error("backend for program '{program}' failed its health check: {reason}")]
    HealthCheck { program: String, reason: String },

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Repo not found: {0}")]
    RepoNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("no host available in role '{0}'")]
    NoHostInRole(String),

    /// A deployment step decided it cannot continue.
    #[error("{0}")]
    Halt(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeployError {
    pub fn halt(msg: impl Into<String>) -> Self {
        DeployError::Halt(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DeployError>;
