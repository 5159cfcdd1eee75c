//! Run requests and their validation.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ScriptSpec;
use crate::script::ScriptProcessBuilder;

/// Which automation script to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    CreateAccount,
    Dropout,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateAccount => f.write_str("create-account"),
            Self::Dropout => f.write_str("dropout"),
        }
    }
}

/// Portal login used by the dropout script.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub netname: String,
    pub password: String,
}

impl LoginCredentials {
    #[must_use]
    pub fn new(netname: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            netname: netname.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("netname", &self.netname)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// API key selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyChoice {
    /// Let the script use its own configured key.
    #[default]
    Builtin,
    /// Pass an explicit key to the script.
    Custom(String),
}

/// Errors found while validating a [`RunRequest`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Dropout mode requires both a netname and a password")]
    MissingCredentials,
    #[error("Credentials are only accepted in dropout mode")]
    UnexpectedCredentials,
    #[error("A custom API key was selected but is empty")]
    EmptyApiKey,
}

/// Description of one automation session to launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    pub mode: RunMode,
    pub credentials: Option<LoginCredentials>,
    pub api_key: ApiKeyChoice,
    pub chrome_path: Option<String>,
}

impl RunRequest {
    #[must_use]
    pub fn create_account() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn dropout(netname: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            mode: RunMode::Dropout,
            credentials: Some(LoginCredentials::new(netname, password)),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = ApiKeyChoice::Custom(key.into());
        self
    }

    #[must_use]
    pub fn with_chrome_path(mut self, path: impl Into<String>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    /// Check request invariants, trimming every text field.
    ///
    /// Blank chrome paths are treated as not set; a blank custom API key is
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the request is malformed.
    pub fn validate(self) -> Result<ValidatedRequest, ValidationError> {
        let credentials = match (self.mode, self.credentials) {
            (RunMode::Dropout, Some(creds)) => {
                let netname = creds.netname.trim();
                let password = creds.password.trim();
                if netname.is_empty() || password.is_empty() {
                    return Err(ValidationError::MissingCredentials);
                }
                Some(LoginCredentials::new(netname, password))
            }
            (RunMode::Dropout, None) => return Err(ValidationError::MissingCredentials),
            (RunMode::CreateAccount, Some(_)) => return Err(ValidationError::UnexpectedCredentials),
            (RunMode::CreateAccount, None) => None,
        };

        let api_key = match self.api_key {
            ApiKeyChoice::Builtin => None,
            ApiKeyChoice::Custom(key) => {
                let key = key.trim();
                if key.is_empty() {
                    return Err(ValidationError::EmptyApiKey);
                }
                Some(key.to_string())
            }
        };

        let chrome_path = self
            .chrome_path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        Ok(ValidatedRequest {
            mode: self.mode,
            credentials,
            api_key,
            chrome_path,
        })
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    mode: RunMode,
    credentials: Option<LoginCredentials>,
    api_key: Option<String>,
    chrome_path: Option<String>,
}

impl ValidatedRequest {
    #[must_use]
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    #[must_use]
    pub fn credentials(&self) -> Option<&LoginCredentials> {
        self.credentials.as_ref()
    }

    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    #[must_use]
    pub fn chrome_path(&self) -> Option<&str> {
        self.chrome_path.as_deref()
    }

    /// Assemble the script invocation for this request.
    #[must_use]
    pub fn to_builder(&self, script: &ScriptSpec, working_dir: &Path) -> ScriptProcessBuilder {
        let mut builder = ScriptProcessBuilder::new(script.program.as_str())
            .args(script.args.iter().cloned())
            .working_dir(working_dir);

        if let Some(creds) = &self.credentials {
            builder = builder
                .flag("netname", creds.netname.as_str())
                .flag("password", creds.password.as_str());
        }

        builder
            .optional_flag("apiKey", self.api_key())
            .optional_flag("chromePath", self.chrome_path())
    }
}
