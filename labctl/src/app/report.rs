//! Human and JSON rendering of run results

use std::fmt::Write as _;

use colored::Colorize;
use serde::Serialize;

use crate::errors::OrchError;
use crate::models::task::{RunStatus, RunSummary, TaskOutcome};
use crate::storage::state::StateExport;

pub fn to_json<T: Serialize>(value: &T) -> Result<String, OrchError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn status_label(status: &RunStatus) -> String {
    let text = status.to_string();
    match status {
        RunStatus::Ready => text.green().bold().to_string(),
        RunStatus::Degraded => text.yellow().bold().to_string(),
        RunStatus::Failed(_) | RunStatus::Cancelled => text.red().bold().to_string(),
    }
}

fn outcome_label(outcome: &TaskOutcome) -> String {
    match outcome {
        TaskOutcome::Success => "ok".green().to_string(),
        TaskOutcome::Failed(reason) => format!("{} {}", "failed".red(), reason),
        TaskOutcome::Skipped(reason) => format!("{} {}", "skipped".yellow(), reason),
        TaskOutcome::Pending => "pending".dimmed().to_string(),
    }
}

/// Table of per-host outcomes followed by warnings and notes
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}  {} ({}/{} ok, {} failed, {} skipped)",
        "run".bold(),
        summary.run_id.dimmed(),
        status_label(&summary.status),
        summary.succeeded,
        summary.total,
        summary.failed,
        summary.skipped,
    );

    let width = summary
        .tasks
        .iter()
        .map(|t| t.host.len())
        .max()
        .unwrap_or(0);
    for task in &summary.tasks {
        let _ = writeln!(
            out,
            "  {:width$}  {:<24}  {}",
            task.host,
            task.action,
            outcome_label(&task.outcome),
            width = width
        );
    }

    for warning in &summary.warnings {
        let _ = writeln!(out, "{} {}", "warning:".yellow().bold(), warning);
    }
    for note in &summary.notes {
        let _ = writeln!(out, "{} {}", "note:".cyan(), note);
    }
    out
}

pub fn render_topology(export: &StateExport) -> String {
    let mut out = String::new();
    if export.hosts.is_empty() {
        out.push_str("no hosts registered\n");
    }
    for host in &export.hosts {
        let reachable = if host.reachable {
            "reachable".green()
        } else {
            "unreachable".red()
        };
        let _ = writeln!(
            out,
            "  {:<16} {:<16} {:<14} {}",
            host.id, host.address, host.role.to_string(), reachable
        );
    }
    for credential in &export.credentials {
        let _ = writeln!(
            out,
            "  {} {} issued by {} at {}",
            "credential".bold(),
            credential.redacted_id,
            credential.issued_by,
            credential.issued_at.to_rfc3339()
        );
    }
    out
}
