// src/engine/pipe.rs

//! Two-stage pipelines: the source's stdout feeds the sink's stdin.
//!
//! The orchestration goes through five phases:
//!
//! 1. launch both sides, then set up the source (open stdout/stderr, start,
//!    drain stderr in the background);
//! 2. set up the sink (open stdout/stderr/stdin, start, drain both outputs);
//!    if that fails the already running source is killed and reaped;
//! 3. spawn the connecting copy from source stdout to sink stdin;
//! 4. collect the four I/O completions, closing the sink's stdin as soon as
//!    the copy is done so the sink sees end-of-input;
//! 5. wait both sides concurrently. A failing sink kills the source.
//!
//! Every failure from phases 4 and 5 is kept and merged with
//! [`join_errors`].

use std::io;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::{drain, join_errors, until_settled};
use crate::errors::{CmdpipeError, CommandContext, Result, Stage};
use crate::exec::{CancelToken, Executor, InputStream, Launchable, OutputStream};
use crate::types::{Role, StreamKind};

/// Copy, source stderr, sink stdout, sink stderr.
const PIPE_EVENTS: usize = 4;

/// Outcome of a pipeline.
///
/// There is no source stdout: it was fed to the sink.
#[derive(Debug, Default)]
pub struct PipeResult {
    pub src_stderr: String,
    pub snk_stdout: String,
    pub snk_stderr: String,
    /// `None` iff both sides exited cleanly and every stream was fully copied.
    pub err: Option<CmdpipeError>,
}

impl PipeResult {
    fn failed(err: CmdpipeError) -> Self {
        Self {
            err: Some(err),
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.err.is_none()
    }
}

enum PipeEvent {
    /// The connecting copy is over; the sink's stdin comes back so it can be
    /// closed.
    Copied {
        result: io::Result<u64>,
        stdin: InputStream,
    },
    Drained {
        role: Role,
        stream: StreamKind,
        bytes: Vec<u8>,
        result: io::Result<()>,
    },
}

struct Source {
    exe: Box<dyn Executor>,
    stdout: OutputStream,
}

struct Sink {
    exe: Box<dyn Executor>,
    stdin: InputStream,
}

/// Builder for one pipeline run.
pub struct Pipe<'a> {
    source: &'a Launchable,
    sink: &'a Launchable,
    cancel: Option<CancelToken>,
}

impl<'a> Pipe<'a> {
    pub fn new(source: &'a Launchable, sink: &'a Launchable) -> Self {
        Self {
            source,
            sink,
            cancel: None,
        }
    }

    /// Kill both sides if `token` fires while the pipeline runs.
    pub fn cancel_on(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub async fn run(self) -> PipeResult {
        let src_exe = match self.source.launch().await {
            Ok(exe) => exe,
            Err(err) => return PipeResult::failed(setup_error(Role::Source, err)),
        };
        let snk_exe = match self.sink.launch().await {
            Ok(exe) => exe,
            Err(err) => return PipeResult::failed(setup_error(Role::Sink, err)),
        };

        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            let err = src_exe.context().wrap(Stage::Start, CmdpipeError::Cancelled);
            return PipeResult::failed(setup_error(Role::Source, err));
        }

        let (tx, mut rx) = mpsc::channel::<PipeEvent>(PIPE_EVENTS);

        let source = match send(src_exe, &tx).await {
            Ok(source) => source,
            Err(err) => return PipeResult::failed(setup_error(Role::Source, err)),
        };
        let sink = match recv(snk_exe, &tx).await {
            Ok(sink) => sink,
            Err(err) => {
                abandon(source).await;
                return PipeResult::failed(setup_error(Role::Sink, err));
            }
        };

        let Source { exe: src, stdout } = source;
        let Sink { exe: snk, stdin } = sink;
        debug!(source = %src.context(), sink = %snk.context(), "pipe connected");

        tokio::spawn(connect(stdout, stdin, tx.clone()));
        drop(tx);

        let src = src.as_ref();
        let snk = snk.as_ref();
        let sides = Sides {
            source: src.context(),
            sink: snk.context(),
        };
        let mut outputs = Outputs::default();
        let work = async {
            let io_err = collect(&mut rx, &mut outputs, &sides).await;
            let exit_err = terminate(src, snk).await;
            join_errors([io_err, exit_err])
        };
        let err = until_settled(work, self.cancel.as_ref(), || {
            warn!(source = %src.context(), sink = %snk.context(), "cancellation requested; killing pipe");
            for (role, exe) in [(Role::Source, src), (Role::Sink, snk)] {
                if let Err(err) = exe.kill() {
                    warn!(%role, error = %err, "failed to kill pipe side");
                }
            }
        })
        .await;

        PipeResult {
            src_stderr: outputs.src_stderr,
            snk_stdout: outputs.snk_stdout,
            snk_stderr: outputs.snk_stderr,
            err,
        }
    }
}

/// Connect `source`'s stdout to `sink`'s stdin and run both to completion.
pub async fn pipe(source: &Launchable, sink: &Launchable) -> PipeResult {
    Pipe::new(source, sink).run().await
}

fn setup_error(role: Role, source: CmdpipeError) -> CmdpipeError {
    CmdpipeError::Setup {
        role,
        source: Box::new(source),
    }
}

/// Who is on each end, for labelling stream errors.
struct Sides {
    source: CommandContext,
    sink: CommandContext,
}

impl Sides {
    fn of(&self, role: Role) -> &CommandContext {
        match role {
            Role::Source => &self.source,
            Role::Sink => &self.sink,
        }
    }
}

#[derive(Default)]
struct Outputs {
    src_stderr: String,
    snk_stdout: String,
    snk_stderr: String,
}

/// Open the source's outputs and start it. Its stderr is drained in the
/// background; its stdout is handed back for the connecting copy.
async fn send(exe: Box<dyn Executor>, tx: &mpsc::Sender<PipeEvent>) -> Result<Source> {
    let ctx = exe.context();
    let stdout = exe
        .open_output()
        .map_err(|err| ctx.wrap(Stage::OpenOutput, err))?;
    let stderr = exe
        .open_error_output()
        .map_err(|err| ctx.wrap(Stage::OpenErrorOutput, err))?;

    exe.start()
        .await
        .map_err(|err| ctx.wrap(Stage::Start, err))?;

    tokio::spawn(drain_event(Role::Source, StreamKind::Stderr, stderr, tx.clone()));
    Ok(Source { exe, stdout })
}

/// Open the sink's three endpoints and start it. Both outputs are drained in
/// the background; its stdin is handed back for the connecting copy.
async fn recv(exe: Box<dyn Executor>, tx: &mpsc::Sender<PipeEvent>) -> Result<Sink> {
    let ctx = exe.context();
    let stdout = exe
        .open_output()
        .map_err(|err| ctx.wrap(Stage::OpenOutput, err))?;
    let stderr = exe
        .open_error_output()
        .map_err(|err| ctx.wrap(Stage::OpenErrorOutput, err))?;
    let stdin = exe
        .open_input()
        .map_err(|err| ctx.wrap(Stage::OpenInput, err))?;

    exe.start()
        .await
        .map_err(|err| ctx.wrap(Stage::Start, err))?;

    tokio::spawn(drain_event(Role::Sink, StreamKind::Stderr, stderr, tx.clone()));
    tokio::spawn(drain_event(Role::Sink, StreamKind::Stdout, stdout, tx.clone()));
    Ok(Sink { exe, stdin })
}

/// Tear down a started source after the sink could not be set up.
///
/// The sink's failure is what gets reported, so problems here are only logged.
async fn abandon(source: Source) {
    let Source { exe, stdout } = source;
    drop(stdout);

    let ctx = exe.context();
    if let Err(err) = exe.kill() {
        warn!(source = %ctx, error = %err, "failed to kill pipe source after sink setup failed");
    }
    if let Err(err) = exe.wait().await {
        warn!(source = %ctx, error = %err, "pipe source exited with error after sink setup failed");
    }
}

async fn connect(mut stdout: OutputStream, mut stdin: InputStream, tx: mpsc::Sender<PipeEvent>) {
    let result = tokio::io::copy(&mut stdout, &mut stdin).await;
    drop(stdout);
    let _ = tx.send(PipeEvent::Copied { result, stdin }).await;
}

async fn drain_event(
    role: Role,
    stream: StreamKind,
    reader: OutputStream,
    tx: mpsc::Sender<PipeEvent>,
) {
    let (bytes, result) = drain(reader).await;
    let _ = tx
        .send(PipeEvent::Drained {
            role,
            stream,
            bytes,
            result,
        })
        .await;
}

/// Receive every I/O completion and return the first failure among them.
async fn collect(
    rx: &mut mpsc::Receiver<PipeEvent>,
    outputs: &mut Outputs,
    sides: &Sides,
) -> Option<CmdpipeError> {
    let mut first_error = None;

    for _ in 0..PIPE_EVENTS {
        let Some(event) = rx.recv().await else {
            warn!("pipe task vanished before reporting");
            break;
        };

        let err = match event {
            PipeEvent::Copied { result, mut stdin } => {
                // Closing the sink's stdin lets it see end-of-input and exit.
                if let Err(err) = stdin.shutdown().await {
                    debug!(error = %err, "closing sink stdin failed");
                }
                drop(stdin);
                match result {
                    Ok(bytes) => {
                        debug!(bytes, "pipe copy finished");
                        None
                    }
                    Err(err) => Some(CmdpipeError::Copy {
                        from: sides.source.clone(),
                        to: sides.sink.clone(),
                        source: err,
                    }),
                }
            }
            PipeEvent::Drained {
                role,
                stream,
                bytes,
                result,
            } => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                match (role, stream) {
                    (Role::Source, _) => outputs.src_stderr = text,
                    (Role::Sink, StreamKind::Stdout) => outputs.snk_stdout = text,
                    (Role::Sink, _) => outputs.snk_stderr = text,
                }
                result.err().map(|source| CmdpipeError::Drain {
                    role,
                    context: sides.of(role).clone(),
                    stream,
                    source,
                })
            }
        };

        if first_error.is_none() {
            first_error = err;
        }
    }

    first_error
}

/// Wait both sides concurrently. If the sink fails the source is killed,
/// since nothing will consume its output any more.
async fn terminate(src: &dyn Executor, snk: &dyn Executor) -> Option<CmdpipeError> {
    let src_wait = async {
        src.wait()
            .await
            .err()
            .map(|err| exited(Role::Source, src, err))
    };
    let snk_wait = async {
        match snk.wait().await {
            Ok(()) => None,
            Err(err) => {
                if let Err(kill_err) = src.kill() {
                    warn!(source = %src.context(), error = %kill_err, "failed to kill pipe source after sink failed");
                }
                Some(exited(Role::Sink, snk, err))
            }
        }
    };

    let (src_err, snk_err) = tokio::join!(src_wait, snk_wait);
    join_errors([src_err, snk_err])
}

fn exited(role: Role, exe: &dyn Executor, err: CmdpipeError) -> CmdpipeError {
    CmdpipeError::Exited {
        role,
        source: Box::new(exe.describe_error(Stage::Wait, err)),
    }
}
