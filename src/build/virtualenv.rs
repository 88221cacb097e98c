// src/build/virtualenv.rs

use tracing::{debug, info};

use crate::context::join;
use crate::errors::Result;
use crate::remote::probe::{dir_exists, file_exists};
use crate::remote::{RemoteCommand, RemoteExecutor, quote, run_checked};

/// Shell prefix that activates the environment at `dir`.
pub fn activate_prefix(dir: &str) -> String {
    format!(". {}", quote(&join(dir, "bin/activate")))
}

/// Create an isolated Python environment at `dir`.
///
/// An existing environment with an activation script is reused unless
/// `force` is set, in which case it is deleted first. Returns whether a new
/// environment was created.
pub async fn ensure(
    exec: &dyn RemoteExecutor,
    dir: &str,
    interpreter: Option<&str>,
    force: bool,
) -> Result<bool> {
    let exists = dir_exists(exec, dir).await?;
    if exists && !force && file_exists(exec, &join(dir, "bin/activate")).await? {
        debug!(host = exec.host(), dir, "reusing existing environment");
        return Ok(false);
    }

    if exists {
        let rm = RemoteCommand::new(format!("rm -rf {}", quote(dir)));
        run_checked(exec, &rm, "removing stale environment").await?;
    }

    let mut cmd = String::from("virtualenv");
    if let Some(interp) = interpreter {
        cmd.push_str(&format!(" -p {}", quote(interp)));
    }
    cmd.push(' ');
    cmd.push_str(&quote(dir));
    run_checked(exec, &RemoteCommand::new(cmd), "creating build environment").await?;
    info!(host = exec.host(), dir, ?interpreter, "created build environment");
    Ok(true)
}
