//! Stage tracking for a single run.

use serde::{Deserialize, Serialize};

use crate::script::{Credentials, RunEvent};

/// Stage text shown before the script reports anything.
pub const INITIAL_STAGE: &str = "Starting...";

/// Completion or error marker last reported by the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum OutcomeMarker {
    Completed(String),
    Failed(String),
}

/// Immutable copy of tracker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub current_stage: String,
    /// Incremented on every stage change.
    pub sequence: u64,
    pub credentials: Option<Credentials>,
    pub marker: Option<OutcomeMarker>,
}

impl Default for StageSnapshot {
    fn default() -> Self {
        Self {
            current_stage: INITIAL_STAGE.to_string(),
            sequence: 0,
            credentials: None,
            marker: None,
        }
    }
}

/// Applies classified events to the latest known stage and credentials.
///
/// Single writer: only the run's line loop calls [`StageTracker::apply`].
/// Readers in other contexts receive [`StageSnapshot`] copies.
#[derive(Debug, Clone, Default)]
pub struct StageTracker {
    state: StageSnapshot,
}

impl StageTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an event. Returns `false` if the event was ignored.
    ///
    /// Credentials are captured once; later credential events are ignored.
    pub fn apply(&mut self, event: &RunEvent) -> bool {
        match event {
            RunEvent::StageChanged { stage } => {
                self.state.current_stage.clone_from(stage);
                self.state.sequence = self.state.sequence.saturating_add(1);
                tracing::debug!(stage = %stage, sequence = self.state.sequence, "Stage changed");
                true
            }
            RunEvent::CredentialsExtracted(creds) => {
                if self.state.credentials.is_some() {
                    tracing::warn!(
                        username = %creds.username,
                        "Credentials already captured, ignoring later match"
                    );
                    return false;
                }
                tracing::info!(username = %creds.username, "Credentials captured");
                self.state.credentials = Some(creds.clone());
                true
            }
            RunEvent::Completed { message } => {
                self.state.marker = Some(OutcomeMarker::Completed(message.clone()));
                true
            }
            RunEvent::Failed { message } => {
                self.state.marker = Some(OutcomeMarker::Failed(message.clone()));
                true
            }
            RunEvent::RawLine { .. } => false,
        }
    }

    #[must_use]
    pub fn current_stage(&self) -> &str {
        &self.state.current_stage
    }

    #[must_use]
    pub fn credentials(&self) -> Option<&Credentials> {
        self.state.credentials.as_ref()
    }

    #[must_use]
    pub fn marker(&self) -> Option<&OutcomeMarker> {
        self.state.marker.as_ref()
    }

    #[must_use]
    pub fn snapshot(&self) -> StageSnapshot {
        self.state.clone()
    }
}
