// src/exec/ssh.rs

//! Remote execution through the OpenSSH client.
//!
//! Every executor is an `ssh user@host <cmd>` child process, so it gets the
//! same deferred endpoints and kill handling as a local command. When
//! `control_master` is on, [`SshLauncher::connect`] first opens a multiplexed
//! master connection: authentication problems surface there instead of on
//! the first command, and sessions reuse the one TCP connection. The master
//! is a child of this process and [`Launcher::close`] tears it down.
//!
//! Killing an executor terminates the local `ssh` client. The remote command
//! then sees its channel close; sshd does not forward signals.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::errors::{CmdpipeError, Result};
use crate::exec::backend::{BoxFuture, Executor, Launcher};
use crate::exec::process::ProcessExecutor;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Time allowed for authentication on top of the TCP connect timeout.
const MASTER_AUTH_GRACE_SECS: u64 = 10;

const MASTER_POLL_INTERVAL: Duration = Duration::from_millis(50);

static NEXT_CONTROL_ID: AtomicU64 = AtomicU64::new(0);

/// Connection settings for one remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    pub user: String,
    pub host: String,
    pub port: u16,
    /// Private key passed with `-i`; the agent/default keys are used if unset.
    pub identity_file: Option<PathBuf>,
    /// Extra `-o` options, e.g. `StrictHostKeyChecking=accept-new`.
    pub options: Vec<String>,
    /// Client binary, `ssh` unless overridden.
    pub program: String,
    pub connect_timeout_secs: u64,
    pub control_master: bool,
}

impl SshConfig {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            identity_file: None,
            options: Vec::new(),
            program: "ssh".to_string(),
            connect_timeout_secs: 10,
            control_master: true,
        }
    }

    /// `user@host`, as passed to the client.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Launcher running commands on a remote host over SSH.
#[derive(Debug)]
pub struct SshLauncher {
    config: SshConfig,
    control_path: Option<PathBuf>,
    master: Mutex<Option<Child>>,
    closed: AtomicBool,
}

impl SshLauncher {
    /// Build a launcher and, if `control_master` is set, open the master
    /// connection.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        if let Some(path) = &config.identity_file {
            if !path.exists() {
                return Err(CmdpipeError::ConfigError(format!(
                    "ssh identity file not found: {}",
                    path.display()
                )));
            }
        }

        let control_master = config.control_master;
        let mut launcher = Self::without_master(config);
        launcher.config.control_master = control_master;
        if control_master {
            launcher.open_master().await?;
        }
        Ok(launcher)
    }

    /// Build a launcher that opens a separate connection for every command.
    pub fn without_master(mut config: SshConfig) -> Self {
        config.control_master = false;
        Self {
            config,
            control_path: None,
            master: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    async fn open_master(&mut self) -> Result<()> {
        let path = std::env::temp_dir().join(format!(
            "cmdpipe-{}-{}.sock",
            std::process::id(),
            NEXT_CONTROL_ID.fetch_add(1, Ordering::Relaxed)
        ));

        let mut child = Command::new(&self.config.program)
            .args(self.base_args())
            .args(["-M", "-N", "-S"])
            .arg(&path)
            .arg(self.config.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                self.describe_error(format_args!("error running {}: {err}", self.config.program))
            })?;

        // Always consume stderr so the pipe never fills; keep it for the
        // error message if the master dies.
        let launcher = self.identity();
        let stderr = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut seen = String::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(launcher = %launcher, "ssh master: {}", line);
                    seen.push_str(&line);
                    seen.push('\n');
                }
                seen
            })
        });

        // The control socket only appears once the master has authenticated.
        let budget = self.config.connect_timeout_secs + MASTER_AUTH_GRACE_SECS;
        let deadline = Instant::now() + Duration::from_secs(budget);
        loop {
            if let Some(status) = child.try_wait()? {
                let detail = match stderr {
                    Some(handle) => handle.await.unwrap_or_default(),
                    None => String::new(),
                };
                return Err(self.describe_error(format_args!(
                    "error opening ssh connection ({status}): {}",
                    detail.trim()
                )));
            }
            if path.exists() {
                break;
            }
            if Instant::now() >= deadline {
                let _ = child.kill().await;
                return Err(self.describe_error(format_args!(
                    "timed out opening ssh connection after {budget}s"
                )));
            }
            sleep(MASTER_POLL_INTERVAL).await;
        }

        info!(launcher = %self.identity(), control_path = %path.display(), "ssh master connection opened");
        self.control_path = Some(path);
        *self.master.get_mut().unwrap_or_else(PoisonError::into_inner) = Some(child);
        Ok(())
    }

    /// Options shared by the master and every session.
    fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.display().to_string());
        }

        if self.config.port != DEFAULT_SSH_PORT {
            args.push("-p".to_string());
            args.push(self.config.port.to_string());
        }

        // Never prompt; fail fast on dead connections.
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        for option in &self.config.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }

        args
    }

    /// Full argument vector for running `command` remotely.
    pub fn session_args(&self, command: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.push("-T".to_string());
        if let Some(path) = &self.control_path {
            args.extend([
                "-S".to_string(),
                path.display().to_string(),
                "-o".to_string(),
                "ControlMaster=no".to_string(),
            ]);
        }
        args.push(self.config.destination());
        args.push(command.to_string());
        args
    }
}

impl Launcher for SshLauncher {
    fn launch<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<Box<dyn Executor>>> {
        Box::pin(async move {
            if self.closed.load(Ordering::Acquire) {
                return Err(self.describe_error(format_args!("launcher already closed")));
            }
            let mut cmd = Command::new(&self.config.program);
            cmd.args(self.session_args(command));
            let exe: Box<dyn Executor> =
                Box::new(ProcessExecutor::new(self.identity(), command, cmd));
            Ok(exe)
        })
    }

    fn identity(&self) -> String {
        format!("{}@{}:{}", self.config.user, self.config.host, self.config.port)
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::AcqRel) {
                debug!(launcher = %self.identity(), "close called again; ignoring");
                return Ok(());
            }
            let Some(path) = &self.control_path else {
                return Ok(());
            };
            let master = self
                .master
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();

            let output = Command::new(&self.config.program)
                .arg("-S")
                .arg(path)
                .args(["-O", "exit"])
                .arg(self.config.destination())
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .await?;

            if let Some(mut child) = master {
                if !output.status.success() {
                    let _ = child.start_kill();
                }
                let _ = child.wait().await;
            }

            if output.status.success() {
                info!(launcher = %self.identity(), "ssh master connection closed");
                Ok(())
            } else {
                Err(self.describe_error(format_args!(
                    "error closing ssh connection: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                )))
            }
        })
    }
}

impl Drop for SshLauncher {
    fn drop(&mut self) {
        // The master itself dies with its `kill_on_drop` child handle; a
        // killed master leaves its socket behind.
        if let Some(path) = &self.control_path {
            if !self.closed.load(Ordering::Acquire) {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}
