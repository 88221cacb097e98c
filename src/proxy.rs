// src/proxy.rs

//! Reverse proxy interface and its nginx implementation.

use std::sync::Arc;

use tracing::{info, warn};

use crate::context::join;
use crate::errors::Result;
use crate::remote::{BoxFuture, RemoteCommand, RemoteExecutor, quote, run_checked};

/// A static URL prefix served straight from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticLocation {
    pub url: String,
    /// Absolute path on the host.
    pub path: String,
}

/// One named server block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub listen: u16,
    pub server_names: String,
    /// `host:port` of the backend.
    pub upstream: String,
    pub static_locations: Vec<StaticLocation>,
    pub log_dir: String,
}

pub trait ReverseProxy: Send + Sync {
    fn write_server_config<'a>(&'a self, cfg: &'a ServerConfig) -> BoxFuture<'a, Result<()>>;

    /// Delete the named config. Deleting a config that does not exist is
    /// not an error.
    fn delete_server_config<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>>;

    fn reload(&self) -> BoxFuture<'_, Result<()>>;
}

/// nginx with one include file per server.
pub struct Nginx {
    exec: Arc<dyn RemoteExecutor>,
    include_conf: String,
    use_sudo: bool,
}

impl Nginx {
    pub fn new(exec: Arc<dyn RemoteExecutor>, include_conf: impl Into<String>, use_sudo: bool) -> Self {
        Self {
            exec,
            include_conf: include_conf.into(),
            use_sudo,
        }
    }

    pub fn conf_path(&self, name: &str) -> String {
        join(&self.include_conf, &format!("{name}.conf"))
    }
}

/// Text of an nginx `server { ... }` block.
pub fn render_server(cfg: &ServerConfig) -> String {
    let mut out = String::new();
    out.push_str("server {\n");
    out.push_str(&format!("    listen {};\n", cfg.listen));
    out.push_str(&format!("    server_name {};\n", cfg.server_names));
    out.push_str(&format!(
        "    access_log {};\n",
        join(&cfg.log_dir, "ngaccess.log")
    ));
    out.push_str(&format!(
        "    error_log {};\n",
        join(&cfg.log_dir, "ngerror.log")
    ));
    out.push('\n');
    out.push_str("    location / {\n");
    out.push_str(&format!("        proxy_pass http://{};\n", cfg.upstream));
    out.push_str("        proxy_set_header Host $host;\n");
    out.push_str("        proxy_set_header X-Real-IP $remote_addr;\n");
    out.push_str("        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n");
    out.push_str("        proxy_set_header X-Forwarded-Proto $scheme;\n");
    out.push_str("    }\n");
    for loc in &cfg.static_locations {
        out.push('\n');
        out.push_str(&format!("    location {} {{\n", loc.url));
        out.push_str(&format!("        alias {};\n", loc.path));
        out.push_str("    }\n");
    }
    out.push_str("}\n");
    out
}

impl ReverseProxy for Nginx {
    fn write_server_config<'a>(&'a self, cfg: &'a ServerConfig) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mkdir = RemoteCommand::new(format!("mkdir -p {}", quote(&cfg.log_dir))).sudo(self.use_sudo);
            run_checked(self.exec.as_ref(), &mkdir, "creating proxy log directory").await?;

            let path = self.conf_path(&cfg.name);
            self.exec
                .put_file(render_server(cfg).as_bytes(), &path, self.use_sudo)
                .await?;
            info!(host = self.exec.host(), server = %cfg.name, upstream = %cfg.upstream, "wrote proxy config");
            Ok(())
        })
    }

    fn delete_server_config<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let path = self.conf_path(name);
            let out = self
                .exec
                .run(&RemoteCommand::new(format!("rm -f {}", quote(&path))).sudo(self.use_sudo))
                .await?;
            if out.success {
                info!(host = self.exec.host(), server = name, "deleted proxy config");
            } else {
                warn!(host = self.exec.host(), server = name, output = %out.combined(), "failed to delete proxy config; ignoring");
            }
            Ok(())
        })
    }

    fn reload(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let cmd = RemoteCommand::new("nginx -s reload").sudo(self.use_sudo);
            run_checked(self.exec.as_ref(), &cmd, "reloading nginx").await?;
            info!(host = self.exec.host(), "reloaded nginx");
            Ok(())
        })
    }
}
