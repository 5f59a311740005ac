//! Colored CLI display utilities for supervisor output.
//!
//! Child output is written through untouched; these helpers only print the
//! supervisor's own status lines.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::service::{ExitReport, SpawnError};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Message for an error reported by the service process.
#[must_use]
pub fn spawn_error_message(program: &str, error: &SpawnError) -> String {
    if error.is_not_found() {
        format!("Failed to start the service. Command not found: {program}.")
    } else {
        format!("Service encountered an error: {error}")
    }
}

/// Warnings worth printing for how the service ended.
///
/// A clean exit with code 0 produces none.
#[must_use]
pub fn close_warnings(report: &ExitReport) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Some(code) = report.code.filter(|code| *code != 0) {
        warnings.push(format!("Service terminated with exit code {code}."));
    }
    if let Some(signal) = &report.signal {
        warnings.push(format!("Service terminated with signal {signal}."));
    }
    warnings
}

/// Write a raw output chunk of the service to our stdout.
pub fn forward_stdout(chunk: &[u8]) {
    let mut stdout = io::stdout().lock();
    let _ = stdout.write_all(chunk);
    let _ = stdout.flush();
}

/// Write a raw output chunk of the service to our stderr.
pub fn forward_stderr(chunk: &[u8]) {
    let mut stderr = io::stderr().lock();
    let _ = stderr.write_all(chunk);
    let _ = stderr.flush();
}

/// Print the effective options at startup.
pub fn print_options(command: &str, cwd: &str, address: &str, auto_start: bool) {
    println!(
        "{} {} command={}, cwd={}, reception=http://{}, auto_start={}",
        timestamp().dimmed(),
        "[OPTIONS]".blue().bold(),
        command.cyan(),
        cwd,
        address,
        auto_start
    );
    let _ = io::stdout().flush();
}

/// Print that the service has started.
pub fn print_started() {
    println!(
        "{} {} service started",
        timestamp().dimmed(),
        "[SERVICE]".green().bold()
    );
    let _ = io::stdout().flush();
}

/// Print that an interrupt arrived and the service is being stopped.
pub fn print_interrupted() {
    println!();
    println!(
        "{} {} Interrupted, waiting for service to stop...",
        timestamp().dimmed(),
        "[SIGNAL]".yellow().bold()
    );
    let _ = io::stdout().flush();
}

/// Print that the service has stopped.
pub fn print_stopped() {
    println!(
        "{} {} service stopped",
        timestamp().dimmed(),
        "[SERVICE]".blue().bold()
    );
    let _ = io::stdout().flush();
}

/// Print a warning line.
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "[WARN]".yellow().bold(), message);
}

/// Print an error line.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}
