// src/activation/spec.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// `[roles.<name>.activate]`
///
/// ```toml
/// [roles.web.activate]
/// key = "web"
///
/// [roles.web.activate.backend]
/// app_module = "api.wsgi:app"
/// http_test_path = "/health"
///
/// [roles.web.activate.proxy]
/// listen = 80
/// server_names = "example.com"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActivationSpec {
    /// Distinguishes services activated independently on the same host.
    pub key: String,

    /// Activate even if the last good build is already active.
    #[serde(default)]
    pub force: bool,

    pub backend: BackendSpec,

    #[serde(default)]
    pub proxy: ProxySpec,
}

/// How the backend process is started from a build.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendSpec {
    /// Executable under `<build>/bin`.
    #[serde(default = "default_script")]
    pub script: String,

    /// The `module:variable` application to serve.
    pub app_module: String,

    /// Long-form server options (`--<name> <value>`). `bind` is always
    /// overwritten; `workers` and `name` are defaulted when absent.
    #[serde(default)]
    pub options: BTreeMap<String, String>,

    /// Path probed with an HTTP `HEAD` request once the program is running.
    #[serde(default)]
    pub http_test_path: Option<String>,

    #[serde(default)]
    pub debug: bool,
}

fn default_script() -> String {
    "gunicorn".to_string()
}

/// Reverse proxy parameters for the activated backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProxySpec {
    #[serde(default = "default_listen")]
    pub listen: u16,

    /// `server_name` value; empty string matches any host.
    #[serde(default = "default_server_names")]
    pub server_names: String,

    #[serde(default, rename = "static")]
    pub static_files: Vec<StaticMapping>,

    /// Directory inside the build that `static.local` paths are relative to.
    #[serde(default)]
    pub static_root: Option<String>,

    /// Access/error log directory; defaults to `<context>/logs/<program>`.
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_listen() -> u16 {
    80
}

fn default_server_names() -> String {
    "\"\"".to_string()
}

impl Default for ProxySpec {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            server_names: default_server_names(),
            static_files: Vec::new(),
            static_root: None,
            log_dir: None,
        }
    }
}

/// One `[[...proxy.static]]` entry: URL prefix served from a build path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StaticMapping {
    pub url: String,
    pub local: String,
}
