// src/exec/local.rs

use tokio::process::Command;

use crate::errors::Result;
use crate::exec::backend::{BoxFuture, Executor, Launcher};
use crate::exec::process::ProcessExecutor;

/// Identity reported by [`LocalLauncher`].
pub const LOCAL: &str = "local";

/// Launcher that spawns commands on this machine through a shell.
#[derive(Debug, Clone)]
pub struct LocalLauncher {
    shell: String,
    flag: String,
}

impl LocalLauncher {
    /// `sh -c <cmd>`, or `cmd /C <cmd>` on Windows.
    pub fn new() -> Self {
        if cfg!(windows) {
            Self::with_shell("cmd", "/C")
        } else {
            Self::with_shell("sh", "-c")
        }
    }

    /// Use a different shell, e.g. `bash -c`.
    pub fn with_shell(shell: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            flag: flag.into(),
        }
    }
}

impl Default for LocalLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher for LocalLauncher {
    fn launch<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<Box<dyn Executor>>> {
        Box::pin(async move {
            let mut cmd = Command::new(&self.shell);
            cmd.arg(&self.flag).arg(command);
            let exe: Box<dyn Executor> = Box::new(ProcessExecutor::new(LOCAL, command, cmd));
            Ok(exe)
        })
    }

    fn identity(&self) -> String {
        LOCAL.to_string()
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}
