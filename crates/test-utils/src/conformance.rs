//! Behaviour every launcher must share.
//!
//! Backend test files call these with their own launcher, e.g.
//! `conformance::run_cmd_test(&LocalLauncher::new()).await`. They assume a
//! POSIX shell on the executing side.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use cmdpipe::engine::{pipe, run_cmd, run_cmd_capture, run_cmd_with_input};
use cmdpipe::exec::{Launchable, Launcher};

/// A token unlikely to appear by accident in command output.
pub fn payload() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    format!("{}-{nanos}", std::process::id())
}

/// Exit status decides success.
pub async fn run_cmd_test(launcher: &dyn Launcher) {
    if let Err(err) = run_cmd(launcher, "true").await {
        panic!("running 'true' returned an error: {err}");
    }
    assert!(
        run_cmd(launcher, "false").await.is_err(),
        "running 'false' returned success"
    );
}

/// Input reaches the command's stdin.
pub async fn run_cmd_in_test(launcher: &dyn Launcher) {
    assert!(
        run_cmd_with_input(launcher, "bogus.command", "").await.is_err(),
        "running 'bogus.command' returned success"
    );
    if let Err(err) = run_cmd_with_input(launcher, "grep -q ab", "abc").await {
        panic!("grep -q 'ab' didn't match 'abc': {err}");
    }
    assert!(
        run_cmd_with_input(launcher, "grep -q ba", "abc").await.is_err(),
        "grep -q 'ba' matched 'abc'"
    );
}

/// Stdout is captured exactly, and nothing shows up on stderr.
pub async fn capture_test(launcher: &dyn Launcher) {
    let payload = payload();
    let captured = run_cmd_capture(launcher, &format!("printf '%s' {payload}"))
        .await
        .unwrap_or_else(|err| panic!("capture failed: {err}"));
    assert_eq!(captured.stderr, "", "unexpected stderr");
    assert_eq!(captured.stdout, payload);
}

/// What the source prints comes out of a `cat` sink unchanged.
pub async fn pipe_test(source: Arc<dyn Launcher>, sink: Arc<dyn Launcher>) {
    let payload = payload();
    let src = Launchable::new(source, format!("printf '%s' {payload}"));
    let snk = Launchable::new(sink, "cat");

    let result = pipe(&src, &snk).await;
    if let Some(err) = &result.err {
        panic!("error piping: {err}");
    }
    assert_eq!(result.snk_stdout, payload);
}
