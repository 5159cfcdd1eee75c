//! Events derived from automation script output.
//!
//! Every line the script prints is surfaced as a [`RunEvent::RawLine`];
//! the classifier then derives zero or more structured events from it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Account credentials printed by a script after generating an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.username, self.password)
    }
}

/// One unit of observable progress from a supervised run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A line of combined stdout/stderr output, verbatim.
    RawLine { text: String },
    /// The human-readable stage changed.
    StageChanged { stage: String },
    /// Generated credentials were found in the output.
    CredentialsExtracted(Credentials),
    /// The script reported completion.
    Completed { message: String },
    /// The script reported an error.
    Failed { message: String },
}

impl RunEvent {
    #[must_use]
    pub fn raw(text: impl Into<String>) -> Self {
        Self::RawLine { text: text.into() }
    }

    #[must_use]
    pub fn stage(stage: impl Into<String>) -> Self {
        Self::StageChanged {
            stage: stage.into(),
        }
    }

    /// Returns true for events derived by classification rather than raw output.
    #[must_use]
    pub fn is_derived(&self) -> bool {
        !matches!(self, Self::RawLine { .. })
    }

    /// Returns the stage text if this is a `StageChanged` event.
    #[must_use]
    pub fn stage_text(&self) -> Option<&str> {
        match self {
            Self::StageChanged { stage } => Some(stage),
            _ => None,
        }
    }
}
