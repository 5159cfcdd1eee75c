//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::script::DEFAULT_LINE_BUFFER;
use crate::supervisor::RunMode;

/// Program and leading arguments used to launch one automation script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ScriptSpec {
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

fn default_create_account() -> ScriptSpec {
    ScriptSpec::new("node", ["deckathonRegister.js"])
}

fn default_dropout() -> ScriptSpec {
    ScriptSpec::new("node", ["deckathonDropout.js"])
}

fn default_terminate_timeout_secs() -> u64 {
    5
}

fn default_line_buffer() -> usize {
    DEFAULT_LINE_BUFFER
}

/// Configuration for the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Directory the scripts run in. Defaults to the current directory.
    #[serde(default)]
    pub project_dir: Option<PathBuf>,
    #[serde(default = "default_create_account")]
    pub create_account: ScriptSpec,
    #[serde(default = "default_dropout")]
    pub dropout: ScriptSpec,
    /// Seconds between SIGTERM and SIGKILL when a run is cancelled.
    #[serde(default = "default_terminate_timeout_secs")]
    pub terminate_timeout_secs: u64,
    /// Capacity of the combined output line channel.
    #[serde(default = "default_line_buffer")]
    pub line_buffer: usize,
}

impl SupervisorConfig {
    /// Script launched for the given mode.
    #[must_use]
    pub fn script_for(&self, mode: RunMode) -> &ScriptSpec {
        match mode {
            RunMode::CreateAccount => &self.create_account,
            RunMode::Dropout => &self.dropout,
        }
    }

    #[must_use]
    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_secs(self.terminate_timeout_secs)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            project_dir: None,
            create_account: default_create_account(),
            dropout: default_dropout(),
            terminate_timeout_secs: default_terminate_timeout_secs(),
            line_buffer: default_line_buffer(),
        }
    }
}
