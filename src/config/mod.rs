// src/config/mod.rs

//! Host inventory for cmdpipe.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate hosts and SSH defaults (`validate.rs`).
//! - Turn a `--on` / `--from` / `--to` argument into a launcher (`target.rs`).

pub mod loader;
pub mod model;
pub mod target;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_inventory};
pub use model::{ConfigFile, HostConfig, RawConfigFile, SshSection};
pub use target::{Target, resolve_target};
