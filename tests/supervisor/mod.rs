//! Supervisor module tests.

mod classifier_test;
mod runner_test;

/// Verify all public supervisor types are exported from the library.
#[test]
fn test_all_supervisor_types_exported() {
    use deckathon_supervisor::config::SupervisorConfig;
    use deckathon_supervisor::supervisor::{
        classify_line, ApiKeyChoice, CancellationGate, NullSink, OutcomeMarker,
        ProcessSupervisor, RunError, RunMode, RunOutcome, RunPhase, RunRequest,
        RunStateMachine, StageTracker, ValidationError,
    };

    let _ = ProcessSupervisor::new(SupervisorConfig::default(), ".");
    let _ = CancellationGate::new();
    let _ = StageTracker::new();
    let _ = RunStateMachine::new();
    let _ = NullSink;
    let _ = classify_line("");

    let _: fn() -> RunError = || RunError::ConcurrentRun;
    let _ = ValidationError::MissingCredentials;
    let _ = ApiKeyChoice::Builtin;
    let _ = OutcomeMarker::Completed(String::new());
    let _ = RunOutcome::Cancelled;
    let _ = RunPhase::Idle;
    let _ = RunRequest {
        mode: RunMode::Dropout,
        ..Default::default()
    };
}
