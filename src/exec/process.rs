// src/exec/process.rs

//! Executor backed by a local child process.
//!
//! Both the local and the SSH launcher produce a `ProcessExecutor`; they only
//! differ in the `tokio::process::Command` they build (`sh -c <cmd>` versus
//! `ssh ... user@host <cmd>`).

use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tracing::debug;

use crate::errors::{CmdpipeError, Result};
use crate::exec::backend::{BoxFuture, Executor, InputStream, OutputStream};
use crate::exec::cancel::CancelToken;
use crate::exec::deferred::deferred;
use crate::types::StreamKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    FailedToStart,
    Started,
    Waiting,
    Waited,
}

struct ProcessState {
    phase: Phase,
    cmd: Option<Command>,
    stdin_tx: Option<oneshot::Sender<ChildStdin>>,
    stdout_tx: Option<oneshot::Sender<ChildStdout>>,
    stderr_tx: Option<oneshot::Sender<ChildStderr>>,
    child: Option<Child>,
}

pub struct ProcessExecutor {
    launcher: String,
    command: String,
    kill_switch: CancelToken,
    state: Mutex<ProcessState>,
}

impl ProcessExecutor {
    /// Wrap `cmd`, which should run `command`. All three streams default to
    /// the null device until an endpoint is opened.
    pub fn new(launcher: impl Into<String>, command: impl Into<String>, mut cmd: Command) -> Self {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        Self {
            launcher: launcher.into(),
            command: command.into(),
            kill_switch: CancelToken::new(),
            state: Mutex::new(ProcessState {
                phase: Phase::Created,
                cmd: Some(cmd),
                stdin_tx: None,
                stdout_tx: None,
                stderr_tx: None,
                child: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProcessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check the executor can still be configured and that `stream` was not
    /// opened yet, returning the command to configure.
    fn configurable<'s>(
        state: &'s mut ProcessState,
        stream: StreamKind,
    ) -> Result<&'s mut Command> {
        let already_open = match stream {
            StreamKind::Stdin => state.stdin_tx.is_some(),
            StreamKind::Stdout => state.stdout_tx.is_some(),
            StreamKind::Stderr => state.stderr_tx.is_some(),
        };
        if already_open {
            return Err(CmdpipeError::Lifecycle(format!("{stream} pipe already opened")));
        }
        match (state.phase, state.cmd.as_mut()) {
            (Phase::Created, Some(cmd)) => Ok(cmd),
            _ => Err(CmdpipeError::Lifecycle(format!(
                "cannot open {stream} pipe after start"
            ))),
        }
    }

    fn spawn(&self) -> Result<()> {
        let mut state = self.lock();
        if state.phase != Phase::Created {
            return Err(CmdpipeError::Lifecycle("start called more than once".to_string()));
        }
        let Some(mut cmd) = state.cmd.take() else {
            return Err(CmdpipeError::Lifecycle("command already consumed".to_string()));
        };

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                // Dropping the senders releases every deferred endpoint.
                state.phase = Phase::FailedToStart;
                state.stdin_tx = None;
                state.stdout_tx = None;
                state.stderr_tx = None;
                return Err(err.into());
            }
        };

        // A receiver may already be gone if the caller dropped its endpoint;
        // the pipe end is then simply closed.
        if let (Some(tx), Some(io)) = (state.stdout_tx.take(), child.stdout.take()) {
            let _ = tx.send(io);
        }
        if let (Some(tx), Some(io)) = (state.stderr_tx.take(), child.stderr.take()) {
            let _ = tx.send(io);
        }
        if let (Some(tx), Some(io)) = (state.stdin_tx.take(), child.stdin.take()) {
            let _ = tx.send(io);
        }

        debug!(
            launcher = %self.launcher,
            cmd = %self.command,
            pid = ?child.id(),
            "process started"
        );

        state.child = Some(child);
        state.phase = Phase::Started;
        Ok(())
    }

    fn take_child(&self) -> Result<Child> {
        let mut state = self.lock();
        match state.phase {
            Phase::Started => {}
            Phase::Created | Phase::FailedToStart => {
                return Err(CmdpipeError::Lifecycle(
                    "wait called without a successful start".to_string(),
                ));
            }
            Phase::Waiting | Phase::Waited => {
                return Err(CmdpipeError::Lifecycle("wait called more than once".to_string()));
            }
        }
        let child = state
            .child
            .take()
            .ok_or_else(|| CmdpipeError::Lifecycle("child process missing".to_string()))?;
        state.phase = Phase::Waiting;
        Ok(child)
    }
}

impl Executor for ProcessExecutor {
    fn command(&self) -> &str {
        &self.command
    }

    fn launcher(&self) -> &str {
        &self.launcher
    }

    fn open_input(&self) -> Result<InputStream> {
        let mut state = self.lock();
        Self::configurable(&mut state, StreamKind::Stdin)?.stdin(Stdio::piped());
        let (tx, stream) = deferred::<ChildStdin>();
        state.stdin_tx = Some(tx);
        Ok(Box::new(stream))
    }

    fn open_output(&self) -> Result<OutputStream> {
        let mut state = self.lock();
        Self::configurable(&mut state, StreamKind::Stdout)?.stdout(Stdio::piped());
        let (tx, stream) = deferred::<ChildStdout>();
        state.stdout_tx = Some(tx);
        Ok(Box::new(stream))
    }

    fn open_error_output(&self) -> Result<OutputStream> {
        let mut state = self.lock();
        Self::configurable(&mut state, StreamKind::Stderr)?.stderr(Stdio::piped());
        let (tx, stream) = deferred::<ChildStderr>();
        state.stderr_tx = Some(tx);
        Ok(Box::new(stream))
    }

    fn start(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.spawn() })
    }

    fn wait(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut child = self.take_child()?;

            // Either the process exits on its own, or a kill request arrives
            // while we are waiting on it.
            let status = tokio::select! {
                status = child.wait() => status,
                _ = self.kill_switch.cancelled() => {
                    debug!(
                        launcher = %self.launcher,
                        cmd = %self.command,
                        "kill requested while waiting; terminating process"
                    );
                    if let Err(err) = child.start_kill() {
                        debug!(cmd = %self.command, error = %err, "process already gone");
                    }
                    child.wait().await
                }
            };

            self.lock().phase = Phase::Waited;

            let status = status?;
            debug!(
                launcher = %self.launcher,
                cmd = %self.command,
                exit_code = ?status.code(),
                success = status.success(),
                "process exited"
            );
            if status.success() {
                Ok(())
            } else {
                Err(CmdpipeError::Exit(status))
            }
        })
    }

    fn kill(&self) -> Result<()> {
        let mut state = self.lock();
        match state.phase {
            Phase::Created | Phase::FailedToStart => Err(CmdpipeError::Lifecycle(
                "kill called before a successful start".to_string(),
            )),
            Phase::Started => {
                self.kill_switch.cancel();
                if let Some(child) = state.child.as_mut() {
                    if let Err(err) = child.start_kill() {
                        if err.kind() != std::io::ErrorKind::InvalidInput {
                            return Err(err.into());
                        }
                    }
                }
                Ok(())
            }
            // An in-flight `wait` picks this up through the kill switch.
            Phase::Waiting => {
                self.kill_switch.cancel();
                Ok(())
            }
            Phase::Waited => Ok(()),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::time::timeout;

    fn sh(script: &str) -> ProcessExecutor {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        ProcessExecutor::new("local", script, cmd)
    }

    #[tokio::test]
    async fn output_opened_before_start_is_readable_after() {
        let exe = sh("printf hello");
        let mut out = exe.open_output().unwrap();
        exe.start().await.unwrap();

        let mut text = String::new();
        out.read_to_string(&mut text).await.unwrap();
        exe.wait().await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn lifecycle_misuse_is_reported() {
        let exe = sh("true");
        assert!(matches!(exe.wait().await, Err(CmdpipeError::Lifecycle(_))));
        assert!(matches!(exe.kill(), Err(CmdpipeError::Lifecycle(_))));

        exe.start().await.unwrap();
        assert!(matches!(exe.start().await, Err(CmdpipeError::Lifecycle(_))));
        assert!(matches!(exe.open_output(), Err(CmdpipeError::Lifecycle(_))));

        exe.wait().await.unwrap();
        assert!(matches!(exe.wait().await, Err(CmdpipeError::Lifecycle(_))));
    }

    #[tokio::test]
    async fn kill_after_exit_returns_promptly() {
        let exe = sh("true");
        exe.start().await.unwrap();
        exe.wait().await.unwrap();

        for _ in 0..3 {
            exe.kill().unwrap();
        }
    }

    #[tokio::test]
    async fn kill_reaches_an_in_flight_wait() {
        let exe = sh("sleep 30");
        exe.start().await.unwrap();

        let (waited, ()) = tokio::join!(
            timeout(Duration::from_secs(5), exe.wait()),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                exe.kill().unwrap();
            }
        );

        let err = waited.expect("wait did not return after kill").unwrap_err();
        assert!(matches!(err, CmdpipeError::Exit(_)));
    }

    #[tokio::test]
    async fn failed_spawn_releases_endpoints() {
        let mut cmd = Command::new("/nonexistent/definitely-not-a-shell");
        cmd.arg("-c").arg("true");
        let exe = ProcessExecutor::new("local", "true", cmd);
        let mut out = exe.open_output().unwrap();

        assert!(matches!(exe.start().await, Err(CmdpipeError::IoError(_))));

        let mut buf = Vec::new();
        let n = timeout(Duration::from_secs(1), out.read_to_end(&mut buf))
            .await
            .expect("endpoint left dangling")
            .unwrap();
        assert_eq!(n, 0);
        assert!(matches!(exe.kill(), Err(CmdpipeError::Lifecycle(_))));
    }
}
