// src/exec/mod.rs

//! Execution backends.
//!
//! This module defines the capability contract the orchestration engine
//! drives, and the concrete ways to satisfy it.
//!
//! - [`backend`] holds the `Launcher` / `Executor` traits and `Launchable`.
//! - [`process`] implements `Executor` over `tokio::process`, with
//!   [`deferred`] endpoints that bind once the child is spawned.
//! - [`local`] and [`ssh`] are the two real launchers.
//! - [`verbose`] is a logging decorator over any launcher.
//! - [`cancel`] provides the `CancelToken` used as kill switch and as an
//!   external abort signal.

pub mod backend;
pub mod cancel;
pub mod deferred;
pub mod local;
pub mod process;
pub mod ssh;
pub mod verbose;

pub use backend::{BoxFuture, Executor, InputStream, Launchable, Launcher, OutputStream};
pub use cancel::CancelToken;
pub use local::{LOCAL, LocalLauncher};
pub use process::ProcessExecutor;
pub use ssh::{SshConfig, SshLauncher};
pub use verbose::{LogHook, Verbose};
