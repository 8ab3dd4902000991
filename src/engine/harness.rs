// src/engine/harness.rs

//! Single-command harness.

use std::io;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::{drain, until_settled};
use crate::errors::{CmdpipeError, CommandContext, Result, Stage};
use crate::exec::{CancelToken, Executor, InputStream, Launcher, OutputStream};
use crate::types::{Captured, StreamKind};

/// At most one task per endpoint.
const MAX_STREAM_TASKS: usize = 3;

/// Completion signal of one drain or feed task.
struct Completion {
    stream: StreamKind,
    bytes: Vec<u8>,
    result: io::Result<()>,
}

/// Runs one executor to completion with any combination of stdin feed,
/// stdout capture and stderr capture.
///
/// Streams that are not captured are connected to the null device.
pub struct Harness {
    exe: Box<dyn Executor>,
    stdin: Option<Vec<u8>>,
    capture_stdout: bool,
    capture_stderr: bool,
    cancel: Option<CancelToken>,
}

impl Harness {
    pub fn new(exe: Box<dyn Executor>) -> Self {
        Self {
            exe,
            stdin: None,
            capture_stdout: false,
            capture_stderr: false,
            cancel: None,
        }
    }

    /// Launch `command` with `launcher` and wrap the resulting executor.
    pub async fn launch(launcher: &dyn Launcher, command: &str) -> Result<Self> {
        let exe = launcher.launch(command).await.map_err(|err| {
            CommandContext::new(launcher.identity(), command).wrap(Stage::Launch, err)
        })?;
        Ok(Self::new(exe))
    }

    /// Write `input` to the command's stdin, then close it.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Capture both stdout and stderr.
    pub fn capture(self) -> Self {
        self.capture_stdout().capture_stderr()
    }

    pub fn capture_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }

    pub fn capture_stderr(mut self) -> Self {
        self.capture_stderr = true;
        self
    }

    /// Kill the command if `token` fires before it finishes.
    pub fn cancel_on(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run the command.
    ///
    /// The captured text is returned even when the command fails, so the
    /// stderr of a failing command is available to the caller.
    pub async fn run(self) -> (Captured, Result<()>) {
        let mut captured = Captured::default();
        let result = self.drive(&mut captured).await;
        (captured, result)
    }

    async fn drive(&self, captured: &mut Captured) -> Result<()> {
        let exe = self.exe.as_ref();
        let ctx = exe.context();

        // Open everything before starting; on failure, drop what is already
        // open and never start the process.
        let stdout: Option<OutputStream> = if self.capture_stdout {
            Some(exe.open_output().map_err(|e| ctx.wrap(Stage::OpenOutput, e))?)
        } else {
            None
        };
        let stderr: Option<OutputStream> = if self.capture_stderr {
            match exe.open_error_output() {
                Ok(stream) => Some(stream),
                Err(err) => {
                    drop(stdout);
                    return Err(ctx.wrap(Stage::OpenErrorOutput, err));
                }
            }
        } else {
            None
        };
        let stdin: Option<(InputStream, Vec<u8>)> = match &self.stdin {
            Some(input) => match exe.open_input() {
                Ok(stream) => Some((stream, input.clone())),
                Err(err) => {
                    drop(stdout);
                    drop(stderr);
                    return Err(ctx.wrap(Stage::OpenInput, err));
                }
            },
            None => None,
        };

        let (tx, mut rx) = mpsc::channel::<Completion>(MAX_STREAM_TASKS);
        let mut launched = 0;
        if let Some(reader) = stdout {
            tokio::spawn(drain_into(StreamKind::Stdout, reader, tx.clone()));
            launched += 1;
        }
        if let Some(reader) = stderr {
            tokio::spawn(drain_into(StreamKind::Stderr, reader, tx.clone()));
            launched += 1;
        }
        if let Some((writer, input)) = stdin {
            tokio::spawn(feed(writer, input, tx.clone()));
            launched += 1;
        }
        drop(tx);

        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(ctx.wrap(Stage::Start, CmdpipeError::Cancelled));
        }

        // If start fails the executor releases the endpoints, so the tasks
        // above finish on their own.
        exe.start()
            .await
            .map_err(|err| ctx.wrap(Stage::Start, err))?;
        debug!(launcher = %ctx.launcher, cmd = %ctx.command, tasks = launched, "command started");

        let settle = collect_then_wait(exe, &mut rx, launched, captured);
        let (io_error, waited) = until_settled(settle, self.cancel.as_ref(), || {
            warn!(launcher = %ctx.launcher, cmd = %ctx.command, "cancellation requested; killing command");
            if let Err(err) = exe.kill() {
                warn!(cmd = %ctx.command, error = %err, "failed to kill command");
            }
        })
        .await;

        // A process that ran and failed is authoritative; I/O errors only
        // surface when it exited cleanly.
        match (waited, io_error) {
            (Err(err), _) => Err(ctx.wrap(Stage::Wait, err)),
            (Ok(()), Some((stream, err))) => Err(ctx.wrap(Stage::Io(stream), err.into())),
            (Ok(()), None) => Ok(()),
        }
    }
}

/// Collect one completion per launched task, then wait for the command.
/// Returns the first I/O error seen alongside the wait result.
async fn collect_then_wait(
    exe: &dyn Executor,
    rx: &mut mpsc::Receiver<Completion>,
    launched: usize,
    captured: &mut Captured,
) -> (Option<(StreamKind, io::Error)>, Result<()>) {
    let mut first_error = None;

    for _ in 0..launched {
        let Some(done) = rx.recv().await else {
            warn!(cmd = %exe.command(), "stream task vanished before reporting");
            break;
        };
        match done.stream {
            StreamKind::Stdout => captured.stdout = String::from_utf8_lossy(&done.bytes).into_owned(),
            StreamKind::Stderr => captured.stderr = String::from_utf8_lossy(&done.bytes).into_owned(),
            StreamKind::Stdin => {}
        }
        if let Err(err) = done.result {
            debug!(cmd = %exe.command(), stream = %done.stream, error = %err, "stream task failed");
            if first_error.is_none() {
                first_error = Some((done.stream, err));
            }
        }
    }

    (first_error, exe.wait().await)
}

async fn drain_into(stream: StreamKind, reader: OutputStream, tx: mpsc::Sender<Completion>) {
    let (bytes, result) = drain(reader).await;
    let _ = tx.send(Completion { stream, bytes, result }).await;
}

async fn feed(mut writer: InputStream, input: Vec<u8>, tx: mpsc::Sender<Completion>) {
    let mut result = writer.write_all(&input).await;
    if result.is_ok() {
        result = writer.shutdown().await;
    }
    // Dropping the writer closes the pipe and signals end-of-input.
    drop(writer);
    let _ = tx
        .send(Completion {
            stream: StreamKind::Stdin,
            bytes: Vec::new(),
            result,
        })
        .await;
}

/// Run `command`, discarding any output.
pub async fn run_cmd(launcher: &dyn Launcher, command: &str) -> Result<()> {
    Harness::launch(launcher, command).await?.run().await.1
}

/// Run `command` with `input` on its stdin, discarding any output.
pub async fn run_cmd_with_input(launcher: &dyn Launcher, command: &str, input: &str) -> Result<()> {
    Harness::launch(launcher, command)
        .await?
        .stdin(input)
        .run()
        .await
        .1
}

/// Run `command` and return what it wrote to stdout and stderr.
pub async fn run_cmd_capture(launcher: &dyn Launcher, command: &str) -> Result<Captured> {
    let (captured, result) = Harness::launch(launcher, command).await?.capture().run().await;
    result.map(|()| captured)
}

/// Run `command` with `input` on its stdin and return its stdout and stderr.
pub async fn run_cmd_with_input_capture(
    launcher: &dyn Launcher,
    command: &str,
    input: &str,
) -> Result<Captured> {
    let (captured, result) = Harness::launch(launcher, command)
        .await?
        .stdin(input)
        .capture()
        .run()
        .await;
    result.map(|()| captured)
}
