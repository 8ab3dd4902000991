// tests/verbose_launcher.rs

use std::sync::{Arc, Mutex};

use cmdpipe::engine::run_cmd;
use cmdpipe::exec::{Executor, Launcher, LogHook, Verbose};
use cmdpipe_test_utils::fake_executor::{FakeBehaviour, FakeLauncher};
use cmdpipe_test_utils::init_tracing;

fn recording(inner: FakeLauncher) -> (Verbose, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let hook: LogHook = Arc::new(move |line: &str| sink.lock().unwrap().push(line.to_string()));
    (Verbose::with_hook(Arc::new(inner), hook), lines)
}

#[tokio::test]
async fn lifecycle_calls_are_announced() {
    init_tracing();
    let (verbose, lines) = recording(FakeLauncher::new("fake"));

    run_cmd(&verbose, "true").await.unwrap();

    assert_eq!(
        *lines.lock().unwrap(),
        vec![
            "[fake] Starting command [true]".to_string(),
            "[fake] Waiting for command [true]".to_string(),
        ]
    );
}

#[tokio::test]
async fn failures_are_described_after_the_call() {
    init_tracing();
    let (verbose, lines) =
        recording(FakeLauncher::new("fake").with("false", FakeBehaviour::ok().exits_with("exit status: 1")));

    let exe = verbose.launch("false").await.unwrap();
    assert!(exe.run().await.is_err());
    exe.kill().unwrap();

    assert_eq!(
        *lines.lock().unwrap(),
        vec![
            "[fake] Running command [false]".to_string(),
            "[fake] Command [false] failed: exit status: 1".to_string(),
            "[fake] Killing command [false]".to_string(),
        ]
    );
}

#[tokio::test]
async fn close_outcome_is_reported() {
    init_tracing();
    let inner = FakeLauncher::new("fake");
    let journal = inner.journal();
    let (verbose, lines) = recording(inner);

    verbose.close().await.unwrap();

    assert_eq!(verbose.identity(), "fake");
    assert_eq!(journal.closes(), 1);
    assert_eq!(*lines.lock().unwrap(), vec!["[fake] Close returned ok".to_string()]);
}
