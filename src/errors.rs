// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! Executors return bare errors (`Exit`, `Lifecycle`, `IoError`). The harness
//! and the pipe orchestrator wrap them with a [`CommandContext`] (and, for
//! pipes, a [`Role`]) before handing them to callers, so every reported error
//! says which launcher and which command failed.

use std::fmt;
use std::process::ExitStatus;

use thiserror::Error;

use crate::engine::aggregate::MultiError;
use crate::types::{Role, StreamKind};

#[derive(Error, Debug)]
pub enum CmdpipeError {
    #[error("{launcher}: {message}")]
    Launcher { launcher: String, message: String },

    #[error("cmd {context}: {stage}: {source}")]
    Command {
        context: CommandContext,
        stage: Stage,
        #[source]
        source: Box<CmdpipeError>,
    },

    #[error("{0}")]
    Lifecycle(String),

    #[error("{0}")]
    Exit(ExitStatus),

    #[error("cancelled before start")]
    Cancelled,

    #[error("error setting up pipe {role}: {source}")]
    Setup {
        role: Role,
        #[source]
        source: Box<CmdpipeError>,
    },

    #[error("error piping cmd {from} into cmd {to}: {source}")]
    Copy {
        from: CommandContext,
        to: CommandContext,
        #[source]
        source: std::io::Error,
    },

    #[error("{role} error: cmd {context}: reading {stream}: {source}")]
    Drain {
        role: Role,
        context: CommandContext,
        stream: StreamKind,
        #[source]
        source: std::io::Error,
    },

    #[error("{role} exited with error: {source}")]
    Exited {
        role: Role,
        #[source]
        source: Box<CmdpipeError>,
    },

    #[error(transparent)]
    Multiple(#[from] MultiError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CmdpipeError {
    /// Walk the wrapping layers and return the process exit status, if the
    /// failure was ultimately a non-zero exit.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self {
            CmdpipeError::Exit(status) => Some(*status),
            CmdpipeError::Command { source, .. }
            | CmdpipeError::Setup { source, .. }
            | CmdpipeError::Exited { source, .. } => source.exit_status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CmdpipeError>;

/// Which launcher runs which command, rendered as `local{echo hi}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub launcher: String,
    pub command: String,
}

impl CommandContext {
    pub fn new(launcher: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            launcher: launcher.into(),
            command: command.into(),
        }
    }

    /// Attach this context and the lifecycle stage to an error.
    pub fn wrap(&self, stage: Stage, source: CmdpipeError) -> CmdpipeError {
        CmdpipeError::Command {
            context: self.clone(),
            stage,
            source: Box::new(source),
        }
    }
}

impl fmt::Display for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{{}}}", self.launcher, self.command)
    }
}

/// Point in a command's lifecycle where an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Launch,
    OpenOutput,
    OpenErrorOutput,
    OpenInput,
    Start,
    Wait,
    Io(StreamKind),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Launch => f.write_str("error launching"),
            Stage::OpenOutput => f.write_str("error opening stdout pipe"),
            Stage::OpenErrorOutput => f.write_str("error opening stderr pipe"),
            Stage::OpenInput => f.write_str("error opening stdin pipe"),
            Stage::Start => f.write_str("error starting"),
            Stage::Wait => f.write_str("completed with error"),
            Stage::Io(stream) => write!(f, "error copying {stream}"),
        }
    }
}
