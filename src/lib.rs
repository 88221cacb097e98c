// src/lib.rs

pub mod activation;
pub mod build;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod errors;
pub mod fs;
pub mod inventory;
pub mod logging;
pub mod proxy;
pub mod readiness;
pub mod registry;
pub mod remote;
pub mod supervisor;
pub mod tools;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::build::BuildSource;
use crate::cli::{CliArgs, Command};
use crate::commands::Deployment;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::context::DeployContext;
use crate::fs::RealFileSystem;
use crate::inventory::StaticDirectory;
use crate::remote::DefaultConnector;
use crate::tools::ToolRegistry;
use crate::types::parse_duration;

/// Tag store location, relative to the config file's directory.
pub const TAG_FILE: &str = ".cutover/tags.json";

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - deployment context
/// - instance directory and tag store
/// - host connector and tool registry
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let ctx = DeployContext::from_section(&cfg.context);

    if args.dry_run {
        print_dry_run(&cfg, &ctx, &args.command);
        return Ok(());
    }

    let directory = StaticDirectory::new(
        cfg.hosts.clone(),
        config_root_dir(&config_path).join(TAG_FILE),
        Arc::new(RealFileSystem),
    );
    let connector = DefaultConnector {
        key_file: cfg.context.ssh_key_file.clone(),
        connect_timeout: parse_duration(&cfg.context.ssh_connect_timeout).map_err(|e| anyhow!(e))?,
    };
    let tools = ToolRegistry::from_config(&cfg.tools);

    let deployment = Deployment {
        config: &cfg,
        ctx: &ctx,
        directory: &directory,
        connector: &connector,
        tools: &tools,
    };
    deployment.run_on_role(&args.command).await?;
    Ok(())
}

/// Directory holding the config file, or "." for a bare file name.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Print the resolved plan for the targeted role without contacting hosts.
fn print_dry_run(cfg: &ConfigFile, ctx: &DeployContext, command: &Command) {
    let target = command.target();
    println!("cutover dry-run: {}", command.name());
    println!("  context = {} (root {})", ctx.name, ctx.root());
    println!("  registry = {}", ctx.registry_path());
    println!();

    let Some(role) = cfg.roles.get(&target.role) else {
        println!("role '{}' is not defined", target.role);
        return;
    };

    println!("role {} (user {}):", role.name, role.user);
    let hosts: Vec<_> = cfg
        .hosts
        .iter()
        .filter(|h| h.role == role.name)
        .filter(|h| target.host.as_deref().is_none_or(|name| h.name == name))
        .collect();
    if hosts.is_empty() {
        println!("  hosts: (none)");
    }
    for host in hosts {
        println!("  - {} ({:?} {})", host.name, host.transport, host.address);
    }

    match command {
        Command::Build(_) => match role.build.as_ref().map(|b| &b.source) {
            Some(BuildSource::Plan(plan)) => {
                println!("  build from source: {:?}", plan.repos);
                if let Some(reference) = plan.reference() {
                    println!("      reference: {reference}");
                }
                if let Some(interp) = &plan.interpreter {
                    println!("      interpreter: {interp}");
                }
                if let Some(tests) = &plan.test_plan {
                    println!("      tests: {:?}", tests.commands);
                }
                if plan.tarball {
                    println!("      tarball: true");
                }
            }
            Some(BuildSource::CopyFrom(copy)) => {
                println!("  copy last good build from role {}", copy.role);
            }
            None => println!("  no build section"),
        },
        Command::Activate { force, .. } => match &role.activate {
            Some(spec) => {
                println!("  activate key {} (force: {})", spec.key, spec.force || *force);
                println!(
                    "      app: {}/<build>/bin/{} {}",
                    ctx.builds_root(),
                    spec.backend.script,
                    spec.backend.app_module
                );
                println!(
                    "      proxy: listen {} server_name {}",
                    spec.proxy.listen, spec.proxy.server_names
                );
            }
            None => println!("  no activate section"),
        },
        Command::Deactivate(_) => match &role.activate {
            Some(spec) => println!("  deactivate key {}", spec.key),
            None => println!("  no activate section"),
        },
        Command::Status(_) => println!("  print registry {}", ctx.registry_path()),
        Command::Provision(_) => println!("  tools: {:?}", role.tools),
    }

    debug!("dry-run complete (no host contacted)");
}
