// src/inventory.rs

//! Instance directory: which hosts exist, which role each plays, and the
//! tags recorded against them after builds and activations.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::errors::{DeployError, Result};
use crate::fs::FileSystem;

/// How commands reach a host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Ssh,
    Local,
}

/// One `[[hosts]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Host {
    pub name: String,

    /// Address the operator connects to.
    pub address: String,

    /// Address peers use to reach this host (for `copy_from`). Defaults to
    /// `address`.
    #[serde(default)]
    pub private_address: Option<String>,

    pub role: String,

    #[serde(default)]
    pub transport: Transport,
}

impl Host {
    pub fn private_address(&self) -> &str {
        self.private_address.as_deref().unwrap_or(&self.address)
    }
}

/// Host lookup by role plus per-host tags.
pub trait InstanceDirectory: Send + Sync {
    fn hosts_in_role(&self, role: &str) -> Vec<Host>;

    fn first_host_in_role(&self, role: &str) -> Result<Host> {
        self.hosts_in_role(role)
            .into_iter()
            .next()
            .ok_or_else(|| DeployError::NoHostInRole(role.to_string()))
    }

    fn tag(&self, host: &Host, key: &str, value: &str) -> Result<()>;

    /// Remove a tag; a tag that was never set is not an error.
    fn untag(&self, host: &Host, key: &str) -> Result<()>;

    fn tags(&self, host: &Host) -> Result<BTreeMap<String, String>>;
}

type TagFile = BTreeMap<String, BTreeMap<String, String>>;

/// Directory backed by the `[[hosts]]` list, with tags kept in a JSON file
/// on the operator's machine.
#[derive(Debug, Clone)]
pub struct StaticDirectory {
    hosts: Vec<Host>,
    tag_path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl StaticDirectory {
    pub fn new(hosts: Vec<Host>, tag_path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            hosts,
            tag_path: tag_path.into(),
            fs,
        }
    }

    fn load_tags(&self) -> Result<TagFile> {
        if !self.fs.exists(&self.tag_path) {
            return Ok(TagFile::new());
        }
        let text = self.fs.read_to_string(&self.tag_path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn store_tags(&self, tags: &TagFile) -> Result<()> {
        let text = serde_json::to_string_pretty(tags)?;
        self.fs.write(&self.tag_path, text.as_bytes())?;
        Ok(())
    }
}

impl InstanceDirectory for StaticDirectory {
    fn hosts_in_role(&self, role: &str) -> Vec<Host> {
        self.hosts.iter().filter(|h| h.role == role).cloned().collect()
    }

    fn tag(&self, host: &Host, key: &str, value: &str) -> Result<()> {
        let mut tags = self.load_tags()?;
        tags.entry(host.name.clone())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.store_tags(&tags)?;
        info!(host = %host.name, key, value, "tagged host");
        Ok(())
    }

    fn untag(&self, host: &Host, key: &str) -> Result<()> {
        let mut tags = self.load_tags()?;
        let Some(host_tags) = tags.get_mut(&host.name) else {
            return Ok(());
        };
        if host_tags.remove(key).is_none() {
            return Ok(());
        }
        if host_tags.is_empty() {
            tags.remove(&host.name);
        }
        self.store_tags(&tags)?;
        info!(host = %host.name, key, "removed host tag");
        Ok(())
    }

    fn tags(&self, host: &Host) -> Result<BTreeMap<String, String>> {
        Ok(self.load_tags()?.remove(&host.name).unwrap_or_default())
    }
}
