//! Scriptable launcher for engine tests.
//!
//! `FakeLauncher` hands out `FakeExecutor`s whose behaviour is looked up by
//! command text. Nothing is spawned: outputs are in-memory buffers, stdin is
//! recorded, and `wait` resolves according to the script. Every lifecycle
//! call lands in a shared [`Journal`] so tests can assert on exactly what the
//! engine did.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use anyhow::anyhow;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use cmdpipe::errors::{CmdpipeError, Result};
use cmdpipe::exec::{BoxFuture, CancelToken, Executor, InputStream, Launcher, OutputStream};
use cmdpipe::types::StreamKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Launch(String),
    Open(String, StreamKind),
    Start(String),
    Wait(String),
    Kill(String),
    Close,
}

/// Shared, ordered record of calls plus whatever each command got on stdin.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<Call>>>,
    stdin: Arc<Mutex<HashMap<String, Arc<Mutex<Vec<u8>>>>>>,
}

impl Journal {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn stdin_buffer(&self, command: &str) -> Arc<Mutex<Vec<u8>>> {
        let mut map = self.stdin.lock().unwrap();
        Arc::clone(map.entry(command.to_string()).or_default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn starts(&self, command: &str) -> usize {
        self.count(&Call::Start(command.to_string()))
    }

    pub fn waits(&self, command: &str) -> usize {
        self.count(&Call::Wait(command.to_string()))
    }

    pub fn kills(&self, command: &str) -> usize {
        self.count(&Call::Kill(command.to_string()))
    }

    pub fn closes(&self) -> usize {
        self.count(&Call::Close)
    }

    /// Bytes written to `command`'s stdin so far.
    pub fn stdin_of(&self, command: &str) -> Vec<u8> {
        self.stdin_buffer(command).lock().unwrap().clone()
    }
}

/// What a fake command does.
#[derive(Debug, Clone, Default)]
pub struct FakeBehaviour {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub fail_launch: bool,
    pub fail_open: Option<StreamKind>,
    pub fail_start: bool,
    /// Reading this output endpoint fails instead of yielding data.
    pub fail_read: Option<StreamKind>,
    /// Writes to stdin fail with a broken pipe.
    pub broken_stdin: bool,
    /// `wait` fails with this message.
    pub exit_error: Option<String>,
    /// `wait` only returns once `kill` has been called.
    pub until_killed: bool,
}

impl FakeBehaviour {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn stdout(mut self, bytes: &str) -> Self {
        self.stdout = bytes.as_bytes().to_vec();
        self
    }

    pub fn stderr(mut self, bytes: &str) -> Self {
        self.stderr = bytes.as_bytes().to_vec();
        self
    }

    pub fn fails_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    pub fn fails_open(mut self, stream: StreamKind) -> Self {
        self.fail_open = Some(stream);
        self
    }

    pub fn fails_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn fails_read(mut self, stream: StreamKind) -> Self {
        self.fail_read = Some(stream);
        self
    }

    pub fn broken_stdin(mut self) -> Self {
        self.broken_stdin = true;
        self
    }

    pub fn exits_with(mut self, message: &str) -> Self {
        self.exit_error = Some(message.to_string());
        self
    }

    pub fn until_killed(mut self) -> Self {
        self.until_killed = true;
        self
    }
}

pub struct FakeLauncher {
    name: String,
    journal: Journal,
    scripts: HashMap<String, FakeBehaviour>,
}

impl FakeLauncher {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            journal: Journal::default(),
            scripts: HashMap::new(),
        }
    }

    /// Script `command`; unscripted commands succeed with no output.
    pub fn with(mut self, command: &str, behaviour: FakeBehaviour) -> Self {
        self.scripts.insert(command.to_string(), behaviour);
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl Launcher for FakeLauncher {
    fn launch<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<Box<dyn Executor>>> {
        Box::pin(async move {
            self.journal.record(Call::Launch(command.to_string()));
            let behaviour = self.scripts.get(command).cloned().unwrap_or_default();
            if behaviour.fail_launch {
                return Err(self.describe_error(format_args!("cannot launch {command}")));
            }
            let exe: Box<dyn Executor> = Box::new(FakeExecutor {
                launcher: self.name.clone(),
                command: command.to_string(),
                behaviour,
                journal: self.journal.clone(),
                killed: CancelToken::new(),
                state: Mutex::new(FakeState::default()),
            });
            Ok(exe)
        })
    }

    fn identity(&self) -> String {
        self.name.clone()
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.journal.record(Call::Close);
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
struct FakeState {
    started: bool,
    waited: bool,
}

pub struct FakeExecutor {
    launcher: String,
    command: String,
    behaviour: FakeBehaviour,
    journal: Journal,
    killed: CancelToken,
    state: Mutex<FakeState>,
}

impl FakeExecutor {
    fn open(&self, stream: StreamKind) -> Result<()> {
        self.journal.record(Call::Open(self.command.clone(), stream));
        if self.behaviour.fail_open == Some(stream) {
            return Err(CmdpipeError::Lifecycle(format!("cannot open {stream}")));
        }
        if self.state.lock().unwrap().started {
            return Err(CmdpipeError::Lifecycle(format!("{stream} opened after start")));
        }
        Ok(())
    }

    fn reader(&self, stream: StreamKind, bytes: &[u8]) -> OutputStream {
        if self.behaviour.fail_read == Some(stream) {
            Box::new(FailingReader)
        } else {
            Box::new(io::Cursor::new(bytes.to_vec()))
        }
    }
}

impl Executor for FakeExecutor {
    fn command(&self) -> &str {
        &self.command
    }

    fn launcher(&self) -> &str {
        &self.launcher
    }

    fn open_input(&self) -> Result<InputStream> {
        self.open(StreamKind::Stdin)?;
        Ok(Box::new(Recorder {
            buf: self.journal.stdin_buffer(&self.command),
            broken: self.behaviour.broken_stdin,
        }))
    }

    fn open_output(&self) -> Result<OutputStream> {
        self.open(StreamKind::Stdout)?;
        Ok(self.reader(StreamKind::Stdout, &self.behaviour.stdout))
    }

    fn open_error_output(&self) -> Result<OutputStream> {
        self.open(StreamKind::Stderr)?;
        Ok(self.reader(StreamKind::Stderr, &self.behaviour.stderr))
    }

    fn start(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.journal.record(Call::Start(self.command.clone()));
            let mut state = self.state.lock().unwrap();
            if state.started {
                return Err(CmdpipeError::Lifecycle("already started".to_string()));
            }
            if self.behaviour.fail_start {
                return Err(CmdpipeError::Other(anyhow!("no such command")));
            }
            state.started = true;
            Ok(())
        })
    }

    fn wait(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.journal.record(Call::Wait(self.command.clone()));
            {
                let mut state = self.state.lock().unwrap();
                if !state.started {
                    return Err(CmdpipeError::Lifecycle("wait before start".to_string()));
                }
                if state.waited {
                    return Err(CmdpipeError::Lifecycle("already waited".to_string()));
                }
                state.waited = true;
            }

            if self.behaviour.until_killed {
                self.killed.cancelled().await;
            }
            if self.killed.is_cancelled() {
                return Err(CmdpipeError::Other(anyhow!("signal: killed")));
            }
            match &self.behaviour.exit_error {
                Some(message) => Err(CmdpipeError::Other(anyhow!("{message}"))),
                None => Ok(()),
            }
        })
    }

    fn kill(&self) -> Result<()> {
        self.journal.record(Call::Kill(self.command.clone()));
        let state = self.state.lock().unwrap();
        if !state.started {
            return Err(CmdpipeError::Lifecycle("kill before start".to_string()));
        }
        // After `wait` has returned this changes nothing.
        self.killed.cancel();
        Ok(())
    }
}

/// Stdin endpoint appending to the journal.
struct Recorder {
    buf: Arc<Mutex<Vec<u8>>>,
    broken: bool,
}

impl AsyncWrite for Recorder {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        if self.broken {
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        self.buf.lock().unwrap().extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

struct FailingReader;

impl AsyncRead for FailingReader {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::other("read failed")))
    }
}
