//! Line classification for automation script output.
//!
//! Recognition rules, in emission order:
//! 1. Step marker: `STEP <n>[:] <desc>` at line start.
//! 2. Credential marker: `Credentials: <user> | _ | _ | <password>`.
//! 3. Keyword marker: a known progress keyword anywhere in the line.
//! 4. Completion marker: `COMPLETE` or `Done!` anywhere in the line.
//! 5. Error marker: line starts with `ERROR` or `Error:`.
//!
//! Rules are independent, so one line may yield several events. A line
//! yields at most one stage change: the keyword rule only fires when no
//! step, credential, or completion marker matched. Error lines still take
//! a keyword stage.

use std::sync::LazyLock;

use regex::Regex;

use crate::script::{Credentials, RunEvent};

/// Maximum length of keyword-derived stage text, in characters.
pub const MAX_STAGE_LEN: usize = 50;

static STEP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*STEP (\d+):?\s*(.*)$").expect("step pattern is valid")
});

static CREDENTIALS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Credentials:\s*(\S+)\s*\|\s*[^|]+\s*\|\s*[^|]+\s*\|\s*(\S+)")
        .expect("credentials pattern is valid")
});

static STAGE_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(Connecting|Navigating|Filling|Submitting|Login|OTP|Selecting|Clicking|Payment|Dropout|CAPTCHA|Solving|Complete)",
    )
    .expect("keyword pattern is valid")
});

const COMPLETION_MARKERS: &[&str] = &["COMPLETE", "Done!"];
const ERROR_PREFIXES: &[&str] = &["ERROR", "Error:"];

/// Classify a single output line into zero or more events.
///
/// Pure and deterministic; never returns `RunEvent::RawLine`.
#[must_use]
pub fn classify_line(line: &str) -> Vec<RunEvent> {
    let mut events = Vec::new();

    let step = match_step(line);
    let credentials = match_credentials(line);
    let completed = is_completion(line);
    let failed = is_error(line);

    let has_step = step.is_some();
    let has_credentials = credentials.is_some();

    if let Some(stage) = step {
        events.push(RunEvent::StageChanged { stage });
    }

    if let Some(creds) = credentials {
        events.push(RunEvent::CredentialsExtracted(creds));
    }

    if !has_step && !has_credentials && !completed && STAGE_KEYWORDS.is_match(line) {
        events.push(RunEvent::StageChanged {
            stage: truncate_stage(line),
        });
    }

    if completed {
        events.push(RunEvent::Completed {
            message: line.to_string(),
        });
    }

    if failed {
        events.push(RunEvent::Failed {
            message: line.to_string(),
        });
    }

    events
}

/// Render a step marker as `Step {n}: {desc}`.
fn match_step(line: &str) -> Option<String> {
    let caps = STEP_PATTERN.captures(line)?;
    let number = caps.get(1)?.as_str();
    let desc = caps.get(2).map_or("", |m| m.as_str().trim());
    if desc.is_empty() {
        Some(format!("Step {number}"))
    } else {
        Some(format!("Step {number}: {desc}"))
    }
}

fn match_credentials(line: &str) -> Option<Credentials> {
    let caps = CREDENTIALS_PATTERN.captures(line)?;
    Some(Credentials::new(caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

fn is_completion(line: &str) -> bool {
    COMPLETION_MARKERS.iter().any(|m| line.contains(m))
}

fn is_error(line: &str) -> bool {
    ERROR_PREFIXES.iter().any(|p| line.starts_with(p))
}

/// Truncate stage text to `MAX_STAGE_LEN` characters, ending with `...`.
#[must_use]
pub fn truncate_stage(line: &str) -> String {
    if line.chars().count() <= MAX_STAGE_LEN {
        return line.to_string();
    }
    let mut stage: String = line.chars().take(MAX_STAGE_LEN - 3).collect();
    stage.push_str("...");
    stage
}
