// src/config/target.rs

//! Where a command runs.
//!
//! A target string is one of:
//! - `local`: this machine;
//! - a host name from `[host.<name>]`;
//! - an ad hoc `user@host` or `user@host:port`, using the `[ssh]` defaults.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::model::{ConfigFile, HostConfig, SshSection};
use crate::errors::{CmdpipeError, Result};
use crate::exec::ssh::DEFAULT_SSH_PORT;
use crate::exec::{LOCAL, Launcher, LocalLauncher, SshConfig, SshLauncher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Local,
    Remote(SshConfig),
}

impl Target {
    /// Build the launcher for this target. For remote targets this may open
    /// the SSH master connection.
    pub async fn into_launcher(self) -> Result<Arc<dyn Launcher>> {
        match self {
            Target::Local => Ok(Arc::new(LocalLauncher::new())),
            Target::Remote(config) => Ok(Arc::new(SshLauncher::connect(config).await?)),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Local => f.write_str(LOCAL),
            Target::Remote(config) => write!(f, "{}:{}", config.destination(), config.port),
        }
    }
}

/// Resolve a target string against the inventory.
pub fn resolve_target(cfg: &ConfigFile, spec: &str) -> Result<Target> {
    let spec = spec.trim();
    if spec == LOCAL {
        return Ok(Target::Local);
    }
    if let Some(host) = cfg.host.get(spec) {
        return Ok(Target::Remote(ssh_config_for(host, &cfg.ssh)));
    }
    if spec.contains('@') {
        return parse_ad_hoc(spec, &cfg.ssh).map(Target::Remote);
    }
    Err(CmdpipeError::ConfigError(format!(
        "unknown target '{spec}' (expected '{LOCAL}', a configured host or user@host[:port])"
    )))
}

/// Combine a configured host with the shared `[ssh]` defaults.
pub fn ssh_config_for(host: &HostConfig, ssh: &SshSection) -> SshConfig {
    let mut config = base_config(&host.user, &host.host, ssh);
    config.port = host.port;
    config.identity_file = host
        .identity_file
        .as_deref()
        .map(|path| PathBuf::from(shellexpand::tilde(path).into_owned()));
    config.options = host.options.clone();
    config
}

fn base_config(user: &str, host: &str, ssh: &SshSection) -> SshConfig {
    let mut config = SshConfig::new(user, host);
    config.program = ssh.program.clone();
    config.connect_timeout_secs = ssh.connect_timeout_secs;
    config.control_master = ssh.control_master;
    config
}

fn parse_ad_hoc(spec: &str, ssh: &SshSection) -> Result<SshConfig> {
    let invalid = |why: &str| CmdpipeError::ConfigError(format!("invalid target '{spec}': {why}"));

    let (user, rest) = spec.split_once('@').ok_or_else(|| invalid("missing '@'"))?;
    if user.is_empty() {
        return Err(invalid("empty user"));
    }

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;
            (host, port)
        }
        None => (rest, DEFAULT_SSH_PORT),
    };
    if host.is_empty() {
        return Err(invalid("empty host"));
    }
    if port == 0 {
        return Err(invalid("port 0"));
    }

    let mut config = base_config(user, host, ssh);
    config.port = port;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn inventory() -> ConfigFile {
        let mut host = BTreeMap::new();
        host.insert(
            "build".to_string(),
            HostConfig {
                user: "deploy".to_string(),
                host: "10.0.0.5".to_string(),
                port: 2222,
                identity_file: Some("~/.ssh/id_ed25519".to_string()),
                options: vec!["StrictHostKeyChecking=accept-new".to_string()],
            },
        );
        ConfigFile::new_unchecked(SshSection::default(), host)
    }

    #[test]
    fn local_is_always_available() {
        assert_eq!(resolve_target(&ConfigFile::default(), "local").unwrap(), Target::Local);
    }

    #[test]
    fn configured_hosts_take_ssh_defaults() {
        let Target::Remote(config) = resolve_target(&inventory(), "build").unwrap() else {
            panic!("expected a remote target");
        };
        assert_eq!(config.destination(), "deploy@10.0.0.5");
        assert_eq!(config.port, 2222);
        assert_eq!(config.program, "ssh");
        assert!(config.control_master);
        assert_eq!(config.options, vec!["StrictHostKeyChecking=accept-new"]);

        let identity = config.identity_file.unwrap();
        assert!(identity.ends_with(".ssh/id_ed25519"));
        assert!(!identity.starts_with("~"), "tilde not expanded: {}", identity.display());
    }

    #[test]
    fn ad_hoc_targets_parse_port() {
        let cfg = ConfigFile::default();

        let Target::Remote(config) = resolve_target(&cfg, "me@example.org").unwrap() else {
            panic!("expected a remote target");
        };
        assert_eq!(config.port, 22);

        let Target::Remote(config) = resolve_target(&cfg, "me@example.org:2200").unwrap() else {
            panic!("expected a remote target");
        };
        assert_eq!(config.host, "example.org");
        assert_eq!(config.port, 2200);
    }

    #[test]
    fn bad_targets_are_config_errors() {
        let cfg = ConfigFile::default();
        for spec in ["nowhere", "@host", "me@", "me@host:ssh", "me@host:0"] {
            assert!(
                matches!(resolve_target(&cfg, spec), Err(CmdpipeError::ConfigError(_))),
                "{spec} should be rejected"
            );
        }
    }
}
