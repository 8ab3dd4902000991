// tests/local_conformance.rs
#![cfg(unix)]

use std::sync::Arc;

use cmdpipe::exec::{Launcher, LocalLauncher};
use cmdpipe_test_utils::{conformance, init_tracing, with_timeout};

#[tokio::test]
async fn local_run_cmd() {
    init_tracing();
    with_timeout(conformance::run_cmd_test(&LocalLauncher::new())).await;
}

#[tokio::test]
async fn local_run_cmd_in() {
    init_tracing();
    with_timeout(conformance::run_cmd_in_test(&LocalLauncher::new())).await;
}

#[tokio::test]
async fn local_capture() {
    init_tracing();
    with_timeout(conformance::capture_test(&LocalLauncher::new())).await;
}

#[tokio::test]
async fn local_pipe() {
    init_tracing();
    let launcher: Arc<dyn Launcher> = Arc::new(LocalLauncher::new());
    with_timeout(conformance::pipe_test(Arc::clone(&launcher), launcher)).await;
}

#[tokio::test]
async fn local_launcher_identity_and_close() {
    let launcher = LocalLauncher::new();
    assert_eq!(launcher.identity(), "local");
    launcher.close().await.unwrap();
    launcher.close().await.unwrap();
}
