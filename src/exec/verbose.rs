// src/exec/verbose.rs

//! Logging decorator for any [`Launcher`].
//!
//! `Verbose` describes what the wrapped launcher does, and what every
//! executor it builds does: `Run`, `Start`, `Wait` and `Kill` are announced
//! through a hook before being delegated, and failures are reported after.
//! The default hook logs at `info` under the `cmdpipe::verbose` target.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::errors::{CmdpipeError, Result, Stage};
use crate::exec::backend::{BoxFuture, Executor, InputStream, Launcher, OutputStream};

/// Side effect invoked with one human-readable line per operation.
pub type LogHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
pub struct Verbose {
    inner: Arc<dyn Launcher>,
    hook: LogHook,
}

impl Verbose {
    pub fn new(inner: Arc<dyn Launcher>) -> Self {
        Self::with_hook(
            inner,
            Arc::new(|line: &str| info!(target: "cmdpipe::verbose", "{}", line)),
        )
    }

    pub fn with_hook(inner: Arc<dyn Launcher>, hook: LogHook) -> Self {
        Self { inner, hook }
    }
}

impl fmt::Debug for Verbose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verbose")
            .field("inner", &self.inner.identity())
            .finish_non_exhaustive()
    }
}

impl Launcher for Verbose {
    fn launch<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<Box<dyn Executor>>> {
        Box::pin(async move {
            let inner = self.inner.launch(command).await?;
            let exe: Box<dyn Executor> = Box::new(VerboseExecutor {
                inner,
                hook: Arc::clone(&self.hook),
            });
            Ok(exe)
        })
    }

    fn identity(&self) -> String {
        self.inner.identity()
    }

    fn describe_error(&self, message: fmt::Arguments<'_>) -> CmdpipeError {
        self.inner.describe_error(message)
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let result = self.inner.close().await;
            let outcome = match &result {
                Ok(()) => "ok".to_string(),
                Err(err) => err.to_string(),
            };
            (self.hook)(&format!("[{}] Close returned {}", self.inner.identity(), outcome));
            result
        })
    }
}

struct VerboseExecutor {
    inner: Box<dyn Executor>,
    hook: LogHook,
}

impl VerboseExecutor {
    fn log(&self, action: &str) {
        (self.hook)(&format!(
            "[{}] {} command [{}]",
            self.inner.launcher(),
            action,
            self.inner.command()
        ));
    }

    fn log_failure(&self, err: &CmdpipeError) {
        (self.hook)(&format!(
            "[{}] Command [{}] failed: {}",
            self.inner.launcher(),
            self.inner.command(),
            err
        ));
    }
}

impl Executor for VerboseExecutor {
    fn command(&self) -> &str {
        self.inner.command()
    }

    fn launcher(&self) -> &str {
        self.inner.launcher()
    }

    fn describe_error(&self, stage: Stage, source: CmdpipeError) -> CmdpipeError {
        self.inner.describe_error(stage, source)
    }

    fn open_input(&self) -> Result<InputStream> {
        self.inner.open_input()
    }

    fn open_output(&self) -> Result<OutputStream> {
        self.inner.open_output()
    }

    fn open_error_output(&self) -> Result<OutputStream> {
        self.inner.open_error_output()
    }

    fn start(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.log("Starting");
            self.inner.start().await
        })
    }

    fn wait(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.log("Waiting for");
            let result = self.inner.wait().await;
            if let Err(err) = &result {
                self.log_failure(err);
            }
            result
        })
    }

    fn kill(&self) -> Result<()> {
        self.log("Killing");
        self.inner.kill()
    }

    fn run(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.log("Running");
            let result = self.inner.run().await;
            if let Err(err) = &result {
                self.log_failure(err);
            }
            result
        })
    }
}
