//! Per-run state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Validating,
    Launching,
    Streaming,
    Completed,
    Failed,
    Cancelled,
    LaunchFailure,
}

impl RunPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::LaunchFailure
        )
    }
}

/// State machine for one run. Terminal phases are final.
#[derive(Debug, Clone, Default)]
pub struct RunStateMachine {
    phase: RunPhase,
}

impl RunStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Move to a new phase. Returns `false` if the run is already terminal.
    pub fn transition(&mut self, new_phase: RunPhase) -> bool {
        if self.phase.is_terminal() {
            tracing::warn!(
                from = ?self.phase,
                to = ?new_phase,
                "Ignoring transition out of terminal phase"
            );
            return false;
        }
        tracing::debug!(from = ?self.phase, to = ?new_phase, "Phase transition");
        self.phase = new_phase;
        true
    }
}
