// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `cutover`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cutover",
    version,
    about = "Build versioned environments on remote hosts and cut traffic over to them.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Cutover.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Cutover.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CUTOVER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print what would run, but don't contact any host.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Produce a new build on every host of a role.
    Build(Target),

    /// Cut traffic over to the last good build.
    Activate {
        #[command(flatten)]
        target: Target,

        /// Activate even if the last good build is already active.
        #[arg(long)]
        force: bool,
    },

    /// Take the active build out of service.
    Deactivate(Target),

    /// Print each host's build registry and tags.
    Status(Target),

    /// Install the tools a role needs.
    Provision(Target),
}

impl Command {
    pub fn target(&self) -> &Target {
        match self {
            Command::Build(t)
            | Command::Deactivate(t)
            | Command::Status(t)
            | Command::Provision(t) => t,
            Command::Activate { target, .. } => target,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Build(_) => "build",
            Command::Activate { .. } => "activate",
            Command::Deactivate(_) => "deactivate",
            Command::Status(_) => "status",
            Command::Provision(_) => "provision",
        }
    }
}

/// Which hosts a command runs on.
#[derive(Debug, Clone, Args)]
pub struct Target {
    /// Role whose hosts are targeted.
    #[arg(long, value_name = "ROLE")]
    pub role: String,

    /// Restrict to a single host of the role.
    #[arg(long, value_name = "NAME")]
    pub host: Option<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
