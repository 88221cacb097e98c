// src/activation/backend.rs

//! Backend start command.

use std::collections::BTreeMap;

use crate::context::join;
use crate::remote::quote;

use super::spec::BackendSpec;

/// Loopback address the backend binds to.
pub const BIND_HOST: &str = "127.0.0.1";

/// Default worker count for a host with `cpus` CPUs.
pub fn default_workers(cpus: u32) -> u32 {
    cpus.saturating_mul(2).saturating_add(1)
}

/// Resolve the final option set: `bind` always points at `port`, `workers`
/// defaults from `cpus`, `name` defaults to `program`, and `debug` raises the
/// log level unless one is given.
pub fn resolve_options(
    backend: &BackendSpec,
    program: &str,
    port: u16,
    cpus: Option<u32>,
) -> BTreeMap<String, String> {
    let mut options = backend.options.clone();
    options.insert("bind".to_string(), format!("{BIND_HOST}:{port}"));
    if let Some(cpus) = cpus {
        options
            .entry("workers".to_string())
            .or_insert_with(|| default_workers(cpus).to_string());
    }
    options
        .entry("name".to_string())
        .or_insert_with(|| program.to_string());
    if backend.debug {
        options
            .entry("log-level".to_string())
            .or_insert_with(|| "debug".to_string());
    }
    options
}

/// `<build_dir>/bin/<script> --<opt> <value> ... <app_module>`
pub fn start_command(
    build_dir: &str,
    backend: &BackendSpec,
    program: &str,
    port: u16,
    cpus: Option<u32>,
) -> String {
    let mut parts = vec![join(build_dir, &format!("bin/{}", backend.script))];
    for (name, value) in resolve_options(backend, program, port, cpus) {
        parts.push(format!("--{name}"));
        parts.push(quote(&value));
    }
    parts.push(quote(&backend.app_module));
    parts.join(" ")
}
