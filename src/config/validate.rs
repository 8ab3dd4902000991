// src/config/validate.rs

use crate::config::model::{ConfigFile, HostConfig, RawConfigFile};
use crate::errors::{CmdpipeError, Result};
use crate::exec::LOCAL;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::CmdpipeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.ssh, raw.host))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_ssh_section(cfg)?;
    for (name, host) in cfg.host.iter() {
        validate_host(name, host)?;
    }
    Ok(())
}

fn validate_ssh_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.ssh.program.trim().is_empty() {
        return Err(CmdpipeError::ConfigError(
            "[ssh].program must not be empty".to_string(),
        ));
    }

    if cfg.ssh.connect_timeout_secs == 0 {
        return Err(CmdpipeError::ConfigError(
            "[ssh].connect_timeout_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_host(name: &str, host: &HostConfig) -> Result<()> {
    // `local` always means this machine.
    if name == LOCAL {
        return Err(CmdpipeError::ConfigError(format!(
            "host name '{LOCAL}' is reserved for the local launcher"
        )));
    }
    if host.user.trim().is_empty() {
        return Err(CmdpipeError::ConfigError(format!(
            "host '{name}' has an empty `user`"
        )));
    }
    if host.host.trim().is_empty() {
        return Err(CmdpipeError::ConfigError(format!(
            "host '{name}' has an empty `host`"
        )));
    }
    if host.port == 0 {
        return Err(CmdpipeError::ConfigError(format!(
            "host '{name}' has port 0"
        )));
    }
    if let Some(option) = host.options.iter().find(|o| !o.contains('=')) {
        return Err(CmdpipeError::ConfigError(format!(
            "host '{name}' has option '{option}' not in Key=Value form"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(toml_src)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn empty_file_is_an_empty_inventory() {
        let cfg = parse("").unwrap();
        assert!(cfg.host.is_empty());
        assert_eq!(cfg.ssh.program, "ssh");
        assert_eq!(cfg.ssh.connect_timeout_secs, 10);
        assert!(cfg.ssh.control_master);
    }

    #[test]
    fn port_defaults_to_22() {
        let cfg = parse(
            r#"
            [host.build]
            user = "deploy"
            host = "10.0.0.5"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.host["build"].port, 22);
    }

    #[test]
    fn rejects_invalid_hosts() {
        let cases = [
            ("[host.a]\nuser = \"\"\nhost = \"h\"", "empty `user`"),
            ("[host.a]\nuser = \"u\"\nhost = \" \"", "empty `host`"),
            ("[host.a]\nuser = \"u\"\nhost = \"h\"\nport = 0", "port 0"),
            ("[host.local]\nuser = \"u\"\nhost = \"h\"", "reserved"),
            (
                "[host.a]\nuser = \"u\"\nhost = \"h\"\noptions = [\"BatchMode\"]",
                "Key=Value",
            ),
            ("[ssh]\nconnect_timeout_secs = 0", "connect_timeout_secs"),
        ];

        for (src, needle) in cases {
            let err = parse(src).unwrap_err();
            assert!(
                matches!(err, CmdpipeError::ConfigError(_)),
                "expected ConfigError for {src:?}, got {err:?}"
            );
            assert!(err.to_string().contains(needle), "{err} lacks {needle:?}");
        }
    }
}
