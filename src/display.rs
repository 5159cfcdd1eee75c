//! Colored CLI display utilities for supervised runs.
//!
//! This module provides functions for printing script output, stage
//! changes, and run summaries to the terminal.

use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::config::EnvFileSummary;
use crate::script::{Credentials, RunEvent};
use crate::supervisor::{RunMode, RunOutcome, RunResult};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Final status line for a finished run.
#[must_use]
pub fn status_text(result: &RunResult) -> String {
    match &result.outcome {
        RunOutcome::Success => "✓ Complete!".to_string(),
        RunOutcome::NonZeroExit => "✗ Error occurred".to_string(),
        RunOutcome::Cancelled => "■ Cancelled".to_string(),
        RunOutcome::LaunchFailure { reason } | RunOutcome::StreamFailure { reason } => {
            format!("✗ Error: {reason}")
        }
    }
}

/// Closing banner for a finished run.
#[must_use]
pub fn summary_text(result: &RunResult) -> String {
    match (&result.outcome, result.exit_code) {
        (RunOutcome::Success, _) => "=== Process completed successfully ===".to_string(),
        (RunOutcome::Cancelled, _) => "=== Process cancelled ===".to_string(),
        (RunOutcome::LaunchFailure { .. }, _) => "=== Process failed to start ===".to_string(),
        (_, Some(code)) => format!("=== Process exited with code {code} ==="),
        (_, None) => "=== Process terminated abnormally ===".to_string(),
    }
}

/// Print run start information.
pub fn print_run_start(mode: RunMode, working_dir: &Path) {
    println!(
        "{} {} mode={}, dir={}",
        timestamp().dimmed(),
        "[RUN]".blue().bold(),
        mode.cyan(),
        working_dir.display().dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print a single run event.
pub fn print_event(event: &RunEvent) {
    match event {
        RunEvent::RawLine { text } => println!("{text}"),
        RunEvent::StageChanged { stage } => {
            println!("{} {}", "[STAGE]".cyan().bold(), stage.bold());
        }
        RunEvent::CredentialsExtracted(creds) => {
            println!(
                "{} captured credentials for {}",
                "[CREDS]".magenta().bold(),
                creds.username.cyan()
            );
        }
        RunEvent::Completed { message } => {
            println!("{} {}", "[DONE]".green().bold(), message);
        }
        RunEvent::Failed { message } => {
            println!("{} {}", "[ERROR]".red().bold(), message.red());
        }
    }
    let _ = io::stdout().flush();
}

/// Print an event as one JSON line.
pub fn print_event_json(event: &RunEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
    }
    let _ = io::stdout().flush();
}

/// Print generated account credentials.
pub fn print_credentials(creds: &Credentials) {
    println!("{}", "Generated credentials".green().bold());
    println!("  {} {}", "Username:".dimmed(), creds.username.bold());
    println!("  {} {}", "Password:".dimmed(), creds.password.bold());
    println!("  {} {}", "Both:".dimmed(), creds);
    let _ = io::stdout().flush();
}

/// Print the end-of-run summary.
pub fn print_run_end(result: &RunResult) {
    let status = status_text(result);
    let summary = summary_text(result);
    if result.is_success() {
        println!("\n{}", summary.green());
        println!("{} {}", "[STATUS]".green().bold(), status);
    } else {
        println!("\n{}", summary.red());
        println!("{} {}", "[STATUS]".red().bold(), status);
    }
    println!("{} {}", "[STAGE]".dimmed(), result.final_stage.dimmed());
    let _ = io::stdout().flush();
}

/// Print labels derived from the project's `.env` file.
pub fn print_env_labels(project_dir: &Path, summary: &EnvFileSummary) {
    println!(
        "{} {}",
        "[ENV]".blue().bold(),
        project_dir.join(crate::config::ENV_FILE_NAME).display()
    );
    println!("  {} {}", "API key:".dimmed(), summary.api_key_label());
    println!("  {} {}", "Chrome:".dimmed(), summary.chrome_label());
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
    let _ = io::stderr().flush();
}
