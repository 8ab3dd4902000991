#![allow(dead_code)]

use std::collections::BTreeMap;

use cmdpipe::config::{ConfigFile, HostConfig, RawConfigFile, SshSection};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                ssh: SshSection::default(),
                host: BTreeMap::new(),
            },
        }
    }

    pub fn with_host(mut self, name: &str, host: HostConfig) -> Self {
        self.config.host.insert(name.to_string(), host);
        self
    }

    pub fn ssh_program(mut self, program: &str) -> Self {
        self.config.ssh.program = program.to_string();
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ssh.connect_timeout_secs = secs;
        self
    }

    pub fn control_master(mut self, val: bool) -> Self {
        self.config.ssh.control_master = val;
        self
    }

    /// The unvalidated form, for tests exercising validation itself.
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `HostConfig`.
pub struct HostConfigBuilder {
    host: HostConfig,
}

impl HostConfigBuilder {
    pub fn new(user: &str, host: &str) -> Self {
        Self {
            host: HostConfig {
                user: user.to_string(),
                host: host.to_string(),
                port: 22,
                identity_file: None,
                options: vec![],
            },
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.host.port = port;
        self
    }

    pub fn identity_file(mut self, path: &str) -> Self {
        self.host.identity_file = Some(path.to_string());
        self
    }

    pub fn option(mut self, option: &str) -> Self {
        self.host.options.push(option.to_string());
        self
    }

    pub fn build(self) -> HostConfig {
        self.host
    }
}
