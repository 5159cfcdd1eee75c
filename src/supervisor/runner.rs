//! Supervisor runner for automation script execution.
//!
//! This module connects request validation, the script process, the
//! combined output stream, and line classification. Each run drives one
//! child process from launch to a [`RunResult`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::SupervisorConfig;
use crate::script::{Credentials, MergedLines, RunEvent, ScriptProcess, StreamError};
use crate::supervisor::{
    classify_line, CancellationGate, EventSink, RunMode, RunPhase, RunRequest, RunStateMachine,
    StageSnapshot, StageTracker, ValidatedRequest, ValidationError,
};

/// Error type for starting a run.
///
/// Everything that happens after launch is reported through [`RunResult`].
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    /// The request was rejected before anything was spawned.
    #[error("Invalid run request: {0}")]
    Validation(#[from] ValidationError),
    /// Another run is active on this supervisor.
    #[error("A run is already active")]
    ConcurrentRun,
    /// The background run task panicked or was aborted.
    #[error("Run task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The script exited with status 0.
    Success,
    /// The script exited unsuccessfully.
    NonZeroExit,
    /// The script could not be started.
    LaunchFailure { reason: String },
    /// The run was stopped through its cancellation gate.
    Cancelled,
    /// Reading the script output failed; the script was killed.
    StreamFailure { reason: String },
}

/// Result of a supervised run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub mode: RunMode,
    /// Exit code, when the script exited normally.
    pub exit_code: Option<i32>,
    pub outcome: RunOutcome,
    pub final_credentials: Option<Credentials>,
    pub final_stage: String,
}

impl RunResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }
}

/// Live view of an active run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub phase: RunPhase,
    pub stage: StageSnapshot,
}

type ActiveSlot = Arc<Mutex<Option<watch::Receiver<RunSnapshot>>>>;

fn lock_slot(slot: &ActiveSlot) -> MutexGuard<'_, Option<watch::Receiver<RunSnapshot>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases the active-run slot when the run ends, on every path.
struct ActiveRunGuard {
    slot: ActiveSlot,
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        lock_slot(&self.slot).take();
    }
}

/// Launches automation scripts, one at a time.
///
/// Clones share the same active-run slot, so a second run on any clone is
/// rejected with [`RunError::ConcurrentRun`] while the first is active.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    config: Arc<SupervisorConfig>,
    working_dir: PathBuf,
    active: ActiveSlot,
}

impl ProcessSupervisor {
    /// Create a supervisor that runs scripts inside `working_dir`.
    #[must_use]
    pub fn new(config: SupervisorConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: Arc::new(config),
            working_dir: working_dir.into(),
            active: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Check whether a run is currently active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        lock_slot(&self.active).is_some()
    }

    /// Latest state of the active run, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<RunSnapshot> {
        lock_slot(&self.active)
            .as_ref()
            .map(|rx| rx.borrow().clone())
    }

    /// Run a script to completion on the current task.
    ///
    /// Events are delivered to `sink` in output order.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Validation` for malformed requests and
    /// `RunError::ConcurrentRun` if another run is active. Nothing is
    /// spawned and no event is emitted in either case.
    pub async fn run<S: EventSink>(
        &self,
        request: RunRequest,
        gate: &CancellationGate,
        mut sink: S,
    ) -> Result<RunResult, RunError> {
        let run = self.prepare(request)?;
        Ok(run.execute(gate, &mut sink).await)
    }

    /// Start a script on a background task and return a handle to it.
    ///
    /// Validation and the concurrency check happen before this returns.
    ///
    /// # Errors
    ///
    /// Same as [`ProcessSupervisor::run`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start<S: EventSink + 'static>(
        &self,
        request: RunRequest,
        mut sink: S,
    ) -> Result<RunHandle, RunError> {
        let run = self.prepare(request)?;
        let run_id = run.run_id;
        let snapshots = run.publisher.subscribe();
        let gate = CancellationGate::new();
        let task_gate = gate.clone();

        let join = tokio::spawn(async move { run.execute(&task_gate, &mut sink).await });

        Ok(RunHandle {
            run_id,
            gate,
            snapshots,
            join,
        })
    }

    /// Validate the request and claim the active-run slot.
    fn prepare(&self, request: RunRequest) -> Result<ActiveRun, RunError> {
        let run_id = Uuid::new_v4();
        let mode = request.mode;
        let mut machine = RunStateMachine::new();
        machine.transition(RunPhase::Validating);

        let request = request.validate().inspect_err(|e| {
            tracing::warn!(%run_id, %mode, error = %e, "Run request rejected");
        })?;

        let tracker = StageTracker::new();
        let initial = RunSnapshot {
            run_id,
            mode,
            phase: machine.phase(),
            stage: tracker.snapshot(),
        };

        let mut slot = lock_slot(&self.active);
        if slot.is_some() {
            tracing::warn!(%run_id, %mode, "Run rejected, another run is active");
            return Err(RunError::ConcurrentRun);
        }
        let (publisher, rx) = watch::channel(initial);
        *slot = Some(rx);
        drop(slot);

        Ok(ActiveRun {
            run_id,
            request,
            working_dir: self.working_dir.clone(),
            config: Arc::clone(&self.config),
            machine,
            tracker,
            publisher,
            _guard: ActiveRunGuard {
                slot: Arc::clone(&self.active),
            },
        })
    }
}

/// Handle to a run started with [`ProcessSupervisor::start`].
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    gate: CancellationGate,
    snapshots: watch::Receiver<RunSnapshot>,
    join: JoinHandle<RunResult>,
}

impl RunHandle {
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Request cancellation of the run.
    pub fn cancel(&self) {
        self.gate.request();
    }

    /// Get a clone of the run's cancellation gate.
    #[must_use]
    pub fn gate(&self) -> CancellationGate {
        self.gate.clone()
    }

    /// Latest published state. Still readable after the run ends.
    #[must_use]
    pub fn snapshot(&self) -> RunSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshots.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to end.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Join` if the run task panicked.
    pub async fn wait(self) -> Result<RunResult, RunError> {
        Ok(self.join.await?)
    }
}

/// Next step of the streaming loop.
enum LoopStep {
    Cancel,
    Line(Option<Result<String, StreamError>>),
}

/// State owned by one run for its whole lifetime.
struct ActiveRun {
    run_id: Uuid,
    request: ValidatedRequest,
    working_dir: PathBuf,
    config: Arc<SupervisorConfig>,
    machine: RunStateMachine,
    tracker: StageTracker,
    publisher: watch::Sender<RunSnapshot>,
    _guard: ActiveRunGuard,
}

impl ActiveRun {
    async fn execute(mut self, gate: &CancellationGate, sink: &mut dyn EventSink) -> RunResult {
        if gate.is_requested() {
            tracing::info!(run_id = %self.run_id, "Run cancelled before launch");
            return self.finish(RunPhase::Cancelled, RunOutcome::Cancelled, None);
        }

        self.set_phase(RunPhase::Launching);
        let script = self.config.script_for(self.request.mode());
        let builder = self.request.to_builder(script, &self.working_dir);
        tracing::info!(
            run_id = %self.run_id,
            mode = %self.request.mode(),
            program = %builder.program(),
            working_dir = %self.working_dir.display(),
            "Launching script"
        );

        let mut process = match ScriptProcess::spawn(&builder) {
            Ok(process) => process,
            Err(e) => {
                tracing::error!(run_id = %self.run_id, error = %e, "Script failed to launch");
                let outcome = RunOutcome::LaunchFailure {
                    reason: e.to_string(),
                };
                return self.finish(RunPhase::LaunchFailure, outcome, None);
            }
        };

        self.set_phase(RunPhase::Streaming);
        tracing::debug!(run_id = %self.run_id, pid = ?process.id(), "Script started");

        let Some(output) = process.take_output() else {
            return self
                .abort_stream(process, StreamError::NoOutput.to_string())
                .await;
        };
        let mut lines = MergedLines::spawn(output, self.config.line_buffer);

        loop {
            let step = tokio::select! {
                biased;
                () = gate.requested() => LoopStep::Cancel,
                next = lines.next_line() => LoopStep::Line(next),
            };

            match step {
                LoopStep::Cancel => {
                    drop(lines);
                    return self.cancel(process).await;
                }
                LoopStep::Line(Some(Ok(line))) => self.handle_line(line, sink),
                LoopStep::Line(Some(Err(e))) => {
                    drop(lines);
                    return self.abort_stream(process, e.to_string()).await;
                }
                LoopStep::Line(None) => break,
            }
        }
        drop(lines);

        let status = tokio::select! {
            biased;
            () = gate.requested() => None,
            status = process.wait() => Some(status),
        };

        match status {
            None => self.cancel(process).await,
            Some(Ok(status)) if status.success() => {
                self.finish(RunPhase::Completed, RunOutcome::Success, status.code())
            }
            Some(Ok(status)) => {
                self.finish(RunPhase::Failed, RunOutcome::NonZeroExit, status.code())
            }
            Some(Err(e)) => {
                tracing::error!(run_id = %self.run_id, error = %e, "Failed to wait for script");
                let outcome = RunOutcome::StreamFailure {
                    reason: format!("wait failed: {e}"),
                };
                self.finish(RunPhase::Failed, outcome, None)
            }
        }
    }

    /// Publish a line and everything derived from it, in order.
    fn handle_line(&mut self, line: String, sink: &mut dyn EventSink) {
        let derived = classify_line(&line);
        tracing::trace!(run_id = %self.run_id, derived = derived.len(), "Line classified");
        sink.emit(RunEvent::RawLine { text: line });

        let mut changed = false;
        for event in derived {
            if self.tracker.apply(&event) {
                changed = true;
                sink.emit(event);
            }
        }

        if changed {
            self.publish();
        }
    }

    async fn cancel(self, mut process: ScriptProcess) -> RunResult {
        tracing::info!(run_id = %self.run_id, pid = ?process.id(), "Terminating script after cancellation");
        let timeout = self.terminate_timeout();
        if let Err(e) = process.graceful_terminate(timeout).await {
            tracing::warn!(run_id = %self.run_id, error = %e, "Failed to terminate script");
        }
        let exit_code = exit_code_after_kill(&mut process);
        self.finish(RunPhase::Cancelled, RunOutcome::Cancelled, exit_code)
    }

    async fn abort_stream(self, mut process: ScriptProcess, reason: String) -> RunResult {
        tracing::error!(run_id = %self.run_id, %reason, "Output stream failed, killing script");
        if let Err(e) = process.kill().await {
            tracing::warn!(run_id = %self.run_id, error = %e, "Failed to kill script");
        }
        let exit_code = exit_code_after_kill(&mut process);
        self.finish(RunPhase::Failed, RunOutcome::StreamFailure { reason }, exit_code)
    }

    fn terminate_timeout(&self) -> Duration {
        self.config.terminate_timeout()
    }

    fn set_phase(&mut self, phase: RunPhase) {
        if self.machine.transition(phase) {
            self.publish();
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(RunSnapshot {
            run_id: self.run_id,
            mode: self.request.mode(),
            phase: self.machine.phase(),
            stage: self.tracker.snapshot(),
        });
    }

    fn finish(mut self, phase: RunPhase, outcome: RunOutcome, exit_code: Option<i32>) -> RunResult {
        self.set_phase(phase);
        tracing::info!(
            run_id = %self.run_id,
            outcome = ?outcome,
            exit_code = ?exit_code,
            stage = %self.tracker.current_stage(),
            "Run finished"
        );

        RunResult {
            run_id: self.run_id,
            mode: self.request.mode(),
            exit_code,
            outcome,
            final_credentials: self.tracker.credentials().cloned(),
            final_stage: self.tracker.current_stage().to_string(),
        }
    }
}

/// Exit code of a process that was just killed and reaped, if it had one.
fn exit_code_after_kill(process: &mut ScriptProcess) -> Option<i32> {
    match process.try_wait() {
        Ok(Some(status)) => status.code(),
        _ => None,
    }
}
