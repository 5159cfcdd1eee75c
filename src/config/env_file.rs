//! Read-only summary of a project's `.env` file.
//!
//! The scripts load `.env` themselves. This summary only tells the calling
//! layer which defaults exist so it can label its choices.

use std::path::{Path, PathBuf};

use super::ConfigError;

pub const ENV_FILE_NAME: &str = ".env";
const API_KEY_VAR: &str = "GEMINI_API_KEY";
const CHROME_PATH_VAR: &str = "CHROME_PATH";
const MAX_LABEL_PATH_LEN: usize = 30;

/// Which script defaults a `.env` file provides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFileSummary {
    pub has_api_key: bool,
    pub chrome_path: Option<String>,
}

impl EnvFileSummary {
    /// Summarize `<project_dir>/.env`. A missing file yields an empty summary.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file exists but cannot be read.
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let path: PathBuf = project_dir.join(ENV_FILE_NAME);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No .env file");
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError { path, source: e })?;
        Ok(Self::parse(&content))
    }

    /// Summarize `.env` content.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut summary = Self::default();
        for line in content.lines() {
            if line.starts_with(&format!("{API_KEY_VAR}=")) {
                summary.has_api_key = true;
            }
            if let Some(value) = line.strip_prefix(&format!("{CHROME_PATH_VAR}=")) {
                let value = value.trim();
                if !value.is_empty() {
                    summary.chrome_path = Some(value.to_string());
                }
            }
        }
        summary
    }

    /// Label for the built-in API key choice.
    #[must_use]
    pub fn api_key_label(&self) -> &'static str {
        if self.has_api_key {
            "Use Built-in (from .env)"
        } else {
            "Use Built-in"
        }
    }

    /// Label for the default Chrome choice.
    #[must_use]
    pub fn chrome_label(&self) -> String {
        match &self.chrome_path {
            Some(path) => format!("Use Default: {}", shorten_path(path)),
            None => "Use Default".to_string(),
        }
    }
}

/// Keep the tail of long paths, prefixed with `...`.
fn shorten_path(path: &str) -> String {
    let len = path.chars().count();
    if len <= MAX_LABEL_PATH_LEN {
        return path.to_string();
    }
    let tail: String = path.chars().skip(len - (MAX_LABEL_PATH_LEN - 3)).collect();
    format!("...{tail}")
}
