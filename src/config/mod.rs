// src/config/mod.rs

//! Configuration loading and validation for cutover.
//!
//! - `model.rs` defines the TOML-backed data model.
//! - `loader.rs` reads a config file.
//! - `validate.rs` turns `RawConfigFile` into a checked `ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_and_validate};
pub use model::{
    ConfigFile, ContextSection, RawBuildSection, RawConfigFile, RawRoleConfig, RepoConfig,
    RoleConfig, TagNames, ToolConfig,
};
