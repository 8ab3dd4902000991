// src/exec/backend.rs

//! Pluggable launcher / executor abstraction.
//!
//! The harness and the pipe orchestrator only ever talk to a [`Launcher`]
//! and the [`Executor`] handles it produces. Where the command actually runs
//! is the launcher's business:
//!
//! - [`LocalLauncher`](super::LocalLauncher) spawns `sh -c <cmd>` locally.
//! - [`SshLauncher`](super::SshLauncher) runs the command on a remote host
//!   through the OpenSSH client.
//! - [`Verbose`](super::Verbose) wraps any launcher and logs what it does.
//!
//! Tests provide their own launcher that doesn't spawn real processes.
//!
//! Both traits return boxed futures so they stay object safe: a pipe can mix
//! a local source with a remote sink behind `Arc<dyn Launcher>`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::errors::{CmdpipeError, CommandContext, Result, Stage};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Writable end feeding a command's stdin.
pub type InputStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Readable end yielding a command's stdout or stderr.
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Factory for [`Executor`]s bound to one execution environment.
pub trait Launcher: Send + Sync {
    /// Create an executor that can run `command`.
    ///
    /// This doesn't spawn anything yet. It may still have side effects
    /// depending on the implementation (an SSH launcher opens a session).
    fn launch<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<Box<dyn Executor>>>;

    /// Stable human-readable label, e.g. `local` or `deploy@build:22`.
    fn identity(&self) -> String;

    /// Build an error prefixed with this launcher's identity.
    fn describe_error(&self, message: fmt::Arguments<'_>) -> CmdpipeError {
        CmdpipeError::Launcher {
            launcher: self.identity(),
            message: message.to_string(),
        }
    }

    /// Release launcher-level resources (e.g. a network connection).
    ///
    /// Call at most once, after every executor it produced has been waited.
    fn close(&self) -> BoxFuture<'_, Result<()>>;
}

/// Handle over one command, local or remote.
///
/// Lifecycle: open the endpoints you need, `start`, drain every opened
/// output endpoint, then `wait` exactly once. Skipping `wait` after a
/// successful `start` leaks the underlying process or session.
pub trait Executor: Send + Sync {
    /// Text of the command to be executed.
    fn command(&self) -> &str;

    /// Identity of the launcher that produced this executor.
    fn launcher(&self) -> &str;

    fn context(&self) -> CommandContext {
        CommandContext::new(self.launcher(), self.command())
    }

    /// Wrap `source` with this command's context and the failing stage.
    fn describe_error(&self, stage: Stage, source: CmdpipeError) -> CmdpipeError {
        self.context().wrap(stage, source)
    }

    /// Writer connected to the command's stdin. Must be called before `start`.
    fn open_input(&self) -> Result<InputStream>;

    /// Reader yielding the command's stdout. Must be called before `start`.
    fn open_output(&self) -> Result<OutputStream>;

    /// Reader yielding the command's stderr. Must be called before `start`.
    fn open_error_output(&self) -> Result<OutputStream>;

    /// Spawn the command.
    ///
    /// On failure the executor drops every endpoint it handed out: readers
    /// see end-of-stream, writers see a broken pipe.
    fn start(&self) -> BoxFuture<'_, Result<()>>;

    /// Wait for the command to finish.
    ///
    /// Errors if the command was killed or exited non-zero. Should not be
    /// called until every opened output endpoint has been fully consumed.
    fn wait(&self) -> BoxFuture<'_, Result<()>>;

    /// Ask a started command to terminate.
    ///
    /// Returns promptly; the command may still be running when it does, so
    /// `wait` must follow. Calling it again, or after `wait`, is harmless.
    fn kill(&self) -> Result<()>;

    /// `start` then `wait`, with all output discarded.
    fn run(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.start().await?;
            self.wait().await
        })
    }
}

/// A launcher paired with the command it should launch.
#[derive(Clone)]
pub struct Launchable {
    pub launcher: Arc<dyn Launcher>,
    pub command: String,
}

impl Launchable {
    pub fn new(launcher: Arc<dyn Launcher>, command: impl Into<String>) -> Self {
        Self {
            launcher,
            command: command.into(),
        }
    }

    /// Launch the command, wrapping failures with launcher and command.
    pub async fn launch(&self) -> Result<Box<dyn Executor>> {
        self.launcher.launch(&self.command).await.map_err(|err| {
            CommandContext::new(self.launcher.identity(), self.command.clone())
                .wrap(Stage::Launch, err)
        })
    }
}

impl fmt::Debug for Launchable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Launchable")
            .field("launcher", &self.launcher.identity())
            .field("command", &self.command)
            .finish()
    }
}
