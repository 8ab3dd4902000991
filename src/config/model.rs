// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::exec::ssh::DEFAULT_SSH_PORT;

/// Raw configuration as read from a TOML file:
///
/// ```toml
/// [ssh]
/// program = "ssh"
/// connect_timeout_secs = 10
/// control_master = true
///
/// [host.build]
/// user = "deploy"
/// host = "10.0.0.5"
/// port = 2222
/// identity_file = "~/.ssh/id_ed25519"
/// options = ["StrictHostKeyChecking=accept-new"]
/// ```
///
/// All sections are optional. This has **not** been validated; use
/// `ConfigFile::try_from` to get a checked [`ConfigFile`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub ssh: SshSection,

    /// Hosts from `[host.<name>]`, keyed by name.
    #[serde(default)]
    pub host: BTreeMap<String, HostConfig>,
}

/// Validated configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub ssh: SshSection,
    pub host: BTreeMap<String, HostConfig>,
}

impl ConfigFile {
    /// Build a config without validation. Callers outside `validate.rs`
    /// should go through `TryFrom<RawConfigFile>`.
    pub(crate) fn new_unchecked(ssh: SshSection, host: BTreeMap<String, HostConfig>) -> Self {
        Self { ssh, host }
    }
}

/// `[ssh]` section: client defaults shared by every host.
#[derive(Debug, Clone, Deserialize)]
pub struct SshSection {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Open one multiplexed master connection per host and run every
    /// command through it.
    #[serde(default = "default_control_master")]
    pub control_master: bool,
}

fn default_program() -> String {
    "ssh".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_control_master() -> bool {
    true
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            connect_timeout_secs: default_connect_timeout_secs(),
            control_master: default_control_master(),
        }
    }
}

/// `[host.<name>]` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HostConfig {
    pub user: String,

    /// Hostname or address.
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Private key; `~` is expanded when the launcher is built.
    #[serde(default)]
    pub identity_file: Option<String>,

    /// Extra `-o` options passed to the client.
    #[serde(default)]
    pub options: Vec<String>,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}
