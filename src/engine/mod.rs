// src/engine/mod.rs

//! Orchestration engine for cmdpipe.
//!
//! This module drives executors through their lifecycle:
//! - [`harness`] runs one command, optionally feeding stdin and capturing
//!   stdout/stderr.
//! - [`pipe`] connects a source's stdout to a sink's stdin and collects the
//!   outcome of both sides.
//! - [`aggregate`] merges independent failures into one error.
//!
//! Every stream endpoint gets its own Tokio task. Tasks own their buffer and
//! hand it back over a single completion channel per run, so no state is
//! shared between them.

use std::future::Future;
use std::io;

use tokio::io::AsyncReadExt;

use crate::exec::{CancelToken, OutputStream};

pub mod aggregate;
pub mod harness;
pub mod pipe;

pub use aggregate::{MultiError, join_errors};
pub use harness::{
    Harness, run_cmd, run_cmd_capture, run_cmd_with_input, run_cmd_with_input_capture,
};
pub use pipe::{Pipe, PipeResult, pipe};

/// Read `reader` to the end. Bytes read before an error are kept.
async fn drain(mut reader: OutputStream) -> (Vec<u8>, io::Result<()>) {
    let mut buf = Vec::new();
    let result = reader.read_to_end(&mut buf).await.map(|_| ());
    (buf, result)
}

/// Drive `work` to completion. If `cancel` fires first, call `on_cancel`
/// (which should kill the commands `work` is waiting on) and keep driving
/// `work`, so processes are still reaped.
async fn until_settled<F, K>(work: F, cancel: Option<&CancelToken>, on_cancel: K) -> F::Output
where
    F: Future,
    K: FnOnce(),
{
    tokio::pin!(work);
    if let Some(token) = cancel {
        tokio::select! {
            out = &mut work => return out,
            _ = token.cancelled() => on_cancel(),
        }
    }
    work.await
}
