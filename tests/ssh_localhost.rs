// tests/ssh_localhost.rs
//
// These tests need an sshd on 127.0.0.1 that accepts the current user's
// default key without a prompt. Run them with `cargo test -- --ignored`.
#![cfg(unix)]

use std::sync::Arc;

use cmdpipe::exec::{Launcher, LocalLauncher, SshConfig, SshLauncher};
use cmdpipe_test_utils::{conformance, init_tracing, with_timeout_secs};

const TIMEOUT_SECS: u64 = 30;

fn config() -> SshConfig {
    let user = std::env::var("USER").unwrap_or_else(|_| "root".to_string());
    let mut config = SshConfig::new(user, "127.0.0.1");
    config.options.push("StrictHostKeyChecking=accept-new".to_string());
    config
}

async fn launcher() -> Arc<dyn Launcher> {
    Arc::new(SshLauncher::connect(config()).await.expect("cannot reach sshd on 127.0.0.1"))
}

#[tokio::test]
#[ignore]
async fn ssh_run_cmd() {
    init_tracing();
    with_timeout_secs(TIMEOUT_SECS, async {
        let l = launcher().await;
        conformance::run_cmd_test(l.as_ref()).await;
        l.close().await.unwrap();
    })
    .await;
}

#[tokio::test]
#[ignore]
async fn ssh_run_cmd_in() {
    init_tracing();
    with_timeout_secs(TIMEOUT_SECS, async {
        let l = launcher().await;
        conformance::run_cmd_in_test(l.as_ref()).await;
        l.close().await.unwrap();
    })
    .await;
}

#[tokio::test]
#[ignore]
async fn ssh_capture() {
    init_tracing();
    with_timeout_secs(TIMEOUT_SECS, async {
        let l = launcher().await;
        conformance::capture_test(l.as_ref()).await;
        l.close().await.unwrap();
    })
    .await;
}

#[tokio::test]
#[ignore]
async fn ssh_pipes() {
    init_tracing();
    with_timeout_secs(TIMEOUT_SECS, async {
        let remote = launcher().await;
        let local: Arc<dyn Launcher> = Arc::new(LocalLauncher::new());

        conformance::pipe_test(Arc::clone(&remote), Arc::clone(&local)).await;
        conformance::pipe_test(Arc::clone(&local), Arc::clone(&remote)).await;
        conformance::pipe_test(Arc::clone(&remote), Arc::clone(&remote)).await;

        remote.close().await.unwrap();
        // Closing twice is harmless.
        remote.close().await.unwrap();
    })
    .await;
}

#[tokio::test]
#[ignore]
async fn ssh_without_master() {
    init_tracing();
    with_timeout_secs(TIMEOUT_SECS, async {
        let l = SshLauncher::without_master(config());
        conformance::run_cmd_test(&l).await;
        l.close().await.unwrap();
    })
    .await;
}
