//! End-to-end tests for supervised runs against stub scripts.

#![cfg(unix)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deckathon_supervisor::config::{ScriptSpec, SupervisorConfig};
use deckathon_supervisor::script::{Credentials, RunEvent};
use deckathon_supervisor::supervisor::{
    CancellationGate, NullSink, ProcessSupervisor, RunError, RunOutcome, RunPhase, RunRequest,
    ValidationError,
};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::sync::mpsc;

fn stub_supervisor(script: &str) -> ProcessSupervisor {
    let config = SupervisorConfig {
        create_account: ScriptSpec::new("sh", ["-c", script]),
        dropout: ScriptSpec::new("sh", ["-c", script]),
        terminate_timeout_secs: 1,
        ..Default::default()
    };
    ProcessSupervisor::new(config, std::env::temp_dir())
}

fn derived(events: &[RunEvent]) -> Vec<RunEvent> {
    events.iter().filter(|e| e.is_derived()).cloned().collect()
}

async fn read_pid(path: &Path) -> i32 {
    loop {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn drain(mut rx: mpsc::UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn create_account_end_to_end() {
    let supervisor = stub_supervisor(
        "echo 'STEP 1: Start'; echo 'Credentials: u1 | x | y | p1'; echo 'COMPLETE'",
    );
    let (tx, rx) = mpsc::unbounded_channel();

    let result = supervisor
        .run(RunRequest::create_account(), &CancellationGate::new(), tx)
        .await
        .unwrap();

    let events = drain(rx);
    assert_eq!(
        derived(&events),
        vec![
            RunEvent::stage("Step 1: Start"),
            RunEvent::CredentialsExtracted(Credentials::new("u1", "p1")),
            RunEvent::Completed {
                message: "COMPLETE".to_string()
            },
        ]
    );
    assert_eq!(result.outcome, RunOutcome::Success);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.final_credentials, Some(Credentials::new("u1", "p1")));
    assert_eq!(result.final_stage, "Step 1: Start");
}

#[tokio::test]
async fn raw_line_precedes_derived_events() {
    let supervisor = stub_supervisor("echo 'STEP 1: Start'");
    let (tx, rx) = mpsc::unbounded_channel();

    supervisor
        .run(RunRequest::create_account(), &CancellationGate::new(), tx)
        .await
        .unwrap();

    assert_eq!(
        drain(rx),
        vec![RunEvent::raw("STEP 1: Start"), RunEvent::stage("Step 1: Start")]
    );
}

#[tokio::test]
async fn only_first_credentials_are_emitted() {
    let supervisor = stub_supervisor(
        "echo 'Credentials: a | 1 | 2 | pa'; echo 'Credentials: b | 3 | 4 | pb'",
    );
    let (tx, rx) = mpsc::unbounded_channel();

    let result = supervisor
        .run(RunRequest::create_account(), &CancellationGate::new(), tx)
        .await
        .unwrap();

    let creds: Vec<_> = drain(rx)
        .into_iter()
        .filter(|e| matches!(e, RunEvent::CredentialsExtracted(_)))
        .collect();
    assert_eq!(creds.len(), 1);
    assert_eq!(result.final_credentials, Some(Credentials::new("a", "pa")));
}

#[tokio::test]
async fn stderr_output_is_streamed() {
    let supervisor = stub_supervisor("echo 'Error: captcha failed' 1>&2; exit 0");
    let (tx, rx) = mpsc::unbounded_channel();

    supervisor
        .run(RunRequest::create_account(), &CancellationGate::new(), tx)
        .await
        .unwrap();

    let events = drain(rx);
    assert!(events.contains(&RunEvent::raw("Error: captcha failed")));
    assert!(events.contains(&RunEvent::Failed {
        message: "Error: captcha failed".to_string()
    }));
}

#[tokio::test]
async fn interleaved_stdout_and_stderr_keep_write_order() {
    let supervisor =
        stub_supervisor("for i in 1 2 3; do echo out$i; echo err$i 1>&2; done");
    let (tx, rx) = mpsc::unbounded_channel();

    supervisor
        .run(RunRequest::create_account(), &CancellationGate::new(), tx)
        .await
        .unwrap();

    let raw: Vec<String> = drain(rx)
        .into_iter()
        .filter_map(|e| match e {
            RunEvent::RawLine { text } => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(raw, vec!["out1", "err1", "out2", "err2", "out3", "err3"]);
}

#[tokio::test]
async fn nonzero_exit_preserves_code() {
    let supervisor = stub_supervisor("echo 'STEP 2: Login'; exit 3");

    let result = supervisor
        .run(RunRequest::create_account(), &CancellationGate::new(), NullSink)
        .await
        .unwrap();

    assert_eq!(result.outcome, RunOutcome::NonZeroExit);
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.final_stage, "Step 2: Login");
}

#[tokio::test]
async fn missing_program_is_launch_failure() {
    let config = SupervisorConfig {
        create_account: ScriptSpec::new("/nonexistent/node", ["deckathonRegister.js"]),
        ..Default::default()
    };
    let supervisor = ProcessSupervisor::new(config, std::env::temp_dir());
    let (tx, rx) = mpsc::unbounded_channel();

    let result = supervisor
        .run(RunRequest::create_account(), &CancellationGate::new(), tx)
        .await
        .unwrap();

    assert!(matches!(result.outcome, RunOutcome::LaunchFailure { .. }));
    assert!(result.exit_code.is_none());
    assert!(drain(rx).is_empty());
    assert!(!supervisor.is_active());
}

#[tokio::test]
async fn invalid_dropout_emits_nothing() {
    let supervisor = stub_supervisor("echo 'should not run'");
    let (tx, rx) = mpsc::unbounded_channel();

    let err = supervisor
        .run(
            RunRequest::dropout("", "secret"),
            &CancellationGate::new(),
            tx,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::Validation(ValidationError::MissingCredentials)
    ));
    assert!(drain(rx).is_empty());
}

#[tokio::test]
async fn dropout_flags_reach_the_script() {
    let supervisor = stub_supervisor(r#"echo "$0 $*""#);
    let (tx, rx) = mpsc::unbounded_channel();

    supervisor
        .run(
            RunRequest::dropout("jdoe", "hunter2").with_chrome_path(""),
            &CancellationGate::new(),
            tx,
        )
        .await
        .unwrap();

    // `sh -c` binds the first extra argument to $0.
    assert_eq!(
        drain(rx),
        vec![RunEvent::raw("--netname=jdoe --password=hunter2")]
    );
}

#[tokio::test]
async fn cancel_before_output_terminates_script() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("script.pid");
    let supervisor = stub_supervisor(&format!(
        "echo $$ > {}; exec sleep 30",
        pid_file.display()
    ));
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = supervisor.start(RunRequest::create_account(), tx).unwrap();
    let pid = tokio::time::timeout(Duration::from_secs(5), read_pid(&pid_file))
        .await
        .expect("script should record its pid");
    handle.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("run should stop after cancellation")
        .unwrap();

    assert_eq!(result.outcome, RunOutcome::Cancelled);
    assert!(drain(rx).is_empty());
    assert!(!supervisor.is_active());
    assert_eq!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH));
}

#[tokio::test]
async fn cancel_mid_stream_stops_reading() {
    let supervisor = stub_supervisor("echo 'STEP 1: Start'; sleep 30; echo 'STEP 2: Never'");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let gate = CancellationGate::new();

    let sink_seen = Arc::clone(&seen);
    let sink_gate = gate.clone();
    let sink = move |event: RunEvent| {
        if event.is_derived() {
            sink_gate.request();
        }
        sink_seen.lock().unwrap().push(event);
    };

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        supervisor.run(RunRequest::create_account(), &gate, sink),
    )
    .await
    .expect("run should stop after cancellation")
    .unwrap();

    assert_eq!(result.outcome, RunOutcome::Cancelled);
    assert_eq!(result.final_stage, "Step 1: Start");
    let seen = seen.lock().unwrap();
    assert!(!seen.contains(&RunEvent::stage("Step 2: Never")));
}

#[tokio::test]
async fn second_run_is_rejected_while_active() {
    let supervisor = stub_supervisor("sleep 30");

    let first = supervisor
        .start(RunRequest::create_account(), NullSink)
        .unwrap();
    let second = supervisor.start(RunRequest::create_account(), NullSink);
    assert!(matches!(second, Err(RunError::ConcurrentRun)));

    // Clones share the same slot.
    let clone = supervisor.clone();
    let third = clone
        .run(RunRequest::create_account(), &CancellationGate::new(), NullSink)
        .await;
    assert!(matches!(third, Err(RunError::ConcurrentRun)));

    first.cancel();
    first.wait().await.unwrap();
    assert!(!supervisor.is_active());
}

#[tokio::test]
async fn new_run_accepted_after_previous_finishes() {
    let supervisor = stub_supervisor("echo 'Done!'");

    for _ in 0..2 {
        let result = supervisor
            .run(RunRequest::create_account(), &CancellationGate::new(), NullSink)
            .await
            .unwrap();
        assert!(result.is_success());
    }
}

#[tokio::test]
async fn snapshot_visible_while_running() {
    let supervisor = stub_supervisor("echo 'STEP 4: Payment'; sleep 30");

    let handle = supervisor
        .start(RunRequest::create_account(), NullSink)
        .unwrap();
    let mut updates = handle.subscribe();

    tokio::time::timeout(
        Duration::from_secs(5),
        updates.wait_for(|s| s.stage.current_stage == "Step 4: Payment"),
    )
    .await
    .expect("stage should be published")
    .unwrap();

    let live = supervisor.snapshot().expect("run is active");
    assert_eq!(live.run_id, handle.run_id());
    assert_eq!(live.phase, RunPhase::Streaming);
    assert_eq!(live.stage.current_stage, "Step 4: Payment");

    handle.cancel();
    let result = handle.wait().await.unwrap();
    assert_eq!(result.outcome, RunOutcome::Cancelled);
    assert!(supervisor.snapshot().is_none());
}

#[tokio::test]
async fn handle_snapshot_reports_terminal_phase() {
    let supervisor = stub_supervisor("exit 1");
    let handle = supervisor
        .start(RunRequest::create_account(), NullSink)
        .unwrap();
    let updates = handle.subscribe();

    let result = handle.wait().await.unwrap();
    assert_eq!(result.outcome, RunOutcome::NonZeroExit);
    assert_eq!(updates.borrow().phase, RunPhase::Failed);
}
