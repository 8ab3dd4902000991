// tests/harness_fake_executor.rs

use std::time::Duration;

use cmdpipe::engine::{Harness, run_cmd, run_cmd_capture, run_cmd_with_input};
use cmdpipe::errors::{CmdpipeError, Stage};
use cmdpipe::exec::CancelToken;
use cmdpipe::types::StreamKind;
use cmdpipe_test_utils::fake_executor::{Call, FakeBehaviour, FakeLauncher};
use cmdpipe_test_utils::{init_tracing, with_timeout};

fn stage_of(err: &CmdpipeError) -> Option<Stage> {
    match err {
        CmdpipeError::Command { stage, .. } => Some(*stage),
        _ => None,
    }
}

#[tokio::test]
async fn captures_stdout_and_stderr() {
    init_tracing();
    let launcher = FakeLauncher::new("fake").with("gen", FakeBehaviour::ok().stdout("out").stderr("err"));

    let captured = with_timeout(run_cmd_capture(&launcher, "gen")).await.unwrap();

    assert_eq!(captured.stdout, "out");
    assert_eq!(captured.stderr, "err");
}

#[tokio::test]
async fn stdin_is_written_then_closed() {
    init_tracing();
    let launcher = FakeLauncher::new("fake");
    let journal = launcher.journal();

    with_timeout(run_cmd_with_input(&launcher, "grep -q ab", "abc"))
        .await
        .unwrap();

    assert_eq!(journal.stdin_of("grep -q ab"), b"abc");
    assert_eq!(journal.starts("grep -q ab"), 1);
    assert_eq!(journal.waits("grep -q ab"), 1);
}

#[tokio::test]
async fn endpoints_are_opened_stdout_stderr_stdin_before_start() {
    init_tracing();
    let launcher = FakeLauncher::new("fake");
    let journal = launcher.journal();

    let (_, result) = Harness::launch(&launcher, "cmd")
        .await
        .unwrap()
        .stdin("x")
        .capture()
        .run()
        .await;
    result.unwrap();

    let cmd = || "cmd".to_string();
    assert_eq!(
        journal.calls(),
        vec![
            Call::Launch(cmd()),
            Call::Open(cmd(), StreamKind::Stdout),
            Call::Open(cmd(), StreamKind::Stderr),
            Call::Open(cmd(), StreamKind::Stdin),
            Call::Start(cmd()),
            Call::Wait(cmd()),
        ]
    );
}

#[tokio::test]
async fn open_failure_starts_nothing() {
    init_tracing();
    let launcher = FakeLauncher::new("fake").with("cmd", FakeBehaviour::ok().fails_open(StreamKind::Stderr));
    let journal = launcher.journal();

    let err = with_timeout(run_cmd_capture(&launcher, "cmd")).await.unwrap_err();

    assert_eq!(stage_of(&err), Some(Stage::OpenErrorOutput));
    assert!(err.to_string().starts_with("cmd fake{cmd}: error opening stderr pipe"), "{err}");
    assert_eq!(journal.starts("cmd"), 0);
    assert_eq!(journal.waits("cmd"), 0);
}

#[tokio::test]
async fn start_failure_is_reported_without_wait() {
    init_tracing();
    let launcher = FakeLauncher::new("fake").with("bogus", FakeBehaviour::ok().fails_start());
    let journal = launcher.journal();

    let err = with_timeout(run_cmd_with_input(&launcher, "bogus", "")).await.unwrap_err();

    assert_eq!(stage_of(&err), Some(Stage::Start));
    assert_eq!(journal.waits("bogus"), 0);
}

#[tokio::test]
async fn launch_failure_names_the_launcher() {
    init_tracing();
    let launcher = FakeLauncher::new("fake").with("cmd", FakeBehaviour::ok().fails_launch());

    let err = run_cmd(&launcher, "cmd").await.unwrap_err();

    assert_eq!(stage_of(&err), Some(Stage::Launch));
    assert_eq!(
        err.to_string(),
        "cmd fake{cmd}: error launching: fake: cannot launch cmd"
    );
}

#[tokio::test]
async fn exit_error_wins_over_stream_error() {
    init_tracing();
    let launcher = FakeLauncher::new("fake").with(
        "cmd",
        FakeBehaviour::ok().fails_read(StreamKind::Stdout).exits_with("exit status: 1"),
    );

    let err = with_timeout(run_cmd_capture(&launcher, "cmd")).await.unwrap_err();

    assert_eq!(stage_of(&err), Some(Stage::Wait));
    assert_eq!(err.to_string(), "cmd fake{cmd}: completed with error: exit status: 1");
}

#[tokio::test]
async fn stream_error_surfaces_when_exit_is_clean() {
    init_tracing();
    let launcher = FakeLauncher::new("fake").with("cmd", FakeBehaviour::ok().fails_read(StreamKind::Stdout));

    let err = with_timeout(run_cmd_capture(&launcher, "cmd")).await.unwrap_err();

    assert_eq!(stage_of(&err), Some(Stage::Io(StreamKind::Stdout)));
    assert!(err.to_string().contains("error copying stdout"), "{err}");
}

#[tokio::test]
async fn broken_stdin_is_reported() {
    init_tracing();
    let launcher = FakeLauncher::new("fake").with("cmd", FakeBehaviour::ok().broken_stdin());

    let err = with_timeout(run_cmd_with_input(&launcher, "cmd", "data")).await.unwrap_err();

    assert_eq!(stage_of(&err), Some(Stage::Io(StreamKind::Stdin)));
}

#[tokio::test]
async fn captured_text_survives_a_failure() {
    init_tracing();
    let launcher = FakeLauncher::new("fake").with(
        "cmd",
        FakeBehaviour::ok().stderr("boom").exits_with("exit status: 2"),
    );

    let (captured, result) = Harness::launch(&launcher, "cmd")
        .await
        .unwrap()
        .capture_stderr()
        .run()
        .await;

    assert_eq!(captured.stderr, "boom");
    assert_eq!(captured.stdout, "");
    assert!(result.is_err());
}

#[tokio::test]
async fn cancellation_kills_and_still_waits() {
    init_tracing();
    let launcher = FakeLauncher::new("fake").with("server", FakeBehaviour::ok().until_killed());
    let journal = launcher.journal();
    let token = CancelToken::new();

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let (_, result) = with_timeout(async {
        Harness::launch(&launcher, "server")
            .await
            .unwrap()
            .cancel_on(token)
            .run()
            .await
    })
    .await;

    assert_eq!(stage_of(&result.unwrap_err()), Some(Stage::Wait));
    assert_eq!(journal.kills("server"), 1);
    assert_eq!(journal.waits("server"), 1);
}

#[tokio::test]
async fn cancelled_token_prevents_start() {
    init_tracing();
    let launcher = FakeLauncher::new("fake");
    let journal = launcher.journal();
    let token = CancelToken::new();
    token.cancel();

    let (_, result) = Harness::launch(&launcher, "cmd")
        .await
        .unwrap()
        .cancel_on(token)
        .run()
        .await;

    let err = result.unwrap_err();
    assert!(err.to_string().ends_with("cancelled before start"), "{err}");
    assert_eq!(journal.starts("cmd"), 0);
}
