//! Deployment tasks and run summaries

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::OrchError;

/// Terminal (or pending) outcome of a single host task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum TaskOutcome {
    Pending,
    Success,
    Failed(String),
    Skipped(String),
}

impl TaskOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskOutcome::Pending)
    }
}

/// One (host × action) unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTask {
    /// Host ID
    pub host: String,

    /// Short action label, e.g. `join` or `run nginx:1.27`
    pub action: String,

    /// Redacted rendering of the commands sent to the host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    /// Number of attempts made
    pub attempt: u32,

    pub outcome: TaskOutcome,
}

impl DeploymentTask {
    pub fn new(
        host: impl Into<String>,
        action: impl Into<String>,
        payload: Option<String>,
    ) -> Self {
        Self {
            host: host.into(),
            action: action.into(),
            payload,
            attempt: 0,
            outcome: TaskOutcome::Pending,
        }
    }

    /// Move the task to its terminal outcome. A task completes exactly once.
    pub fn complete(&mut self, outcome: TaskOutcome) -> Result<(), OrchError> {
        if self.outcome.is_terminal() {
            return Err(OrchError::Internal(format!(
                "Task {} on {} already completed",
                self.action, self.host
            )));
        }
        if !outcome.is_terminal() {
            return Err(OrchError::Internal(
                "Cannot complete a task with a pending outcome".to_string(),
            ));
        }
        self.outcome = outcome;
        Ok(())
    }
}

/// Stage of a cluster bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Init,
    ControlPlaneUp,
    CredentialIssued,
    WorkersJoining,
    Ready,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::ControlPlaneUp => "control-plane-up",
            Stage::CredentialIssued => "credential-issued",
            Stage::WorkersJoining => "workers-joining",
            Stage::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// Top-level status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "lowercase")]
pub enum RunStatus {
    Ready,
    Degraded,
    Failed(Stage),
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Ready => f.write_str("ready"),
            RunStatus::Degraded => f.write_str("degraded"),
            RunStatus::Failed(stage) => write!(f, "failed({})", stage),
            RunStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Which workflow produced the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    Bootstrap,
    Deploy,
    Balancer,
}

/// Aggregate of every task outcome of a run.
///
/// Counters are derived from the task list when the summary is built and are
/// never adjusted afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub mode: RunMode,
    pub status: RunStatus,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub tasks: Vec<DeploymentTask>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Inputs for building a [`RunSummary`]
#[derive(Debug)]
pub struct SummaryBuilder {
    run_id: String,
    mode: RunMode,
    started_at: DateTime<Utc>,
    fatal: Option<Stage>,
    cancelled: bool,
    warnings: Vec<String>,
    notes: Vec<String>,
}

impl SummaryBuilder {
    pub fn new(run_id: impl Into<String>, mode: RunMode) -> Self {
        Self {
            run_id: run_id.into(),
            mode,
            started_at: Utc::now(),
            fatal: None,
            cancelled: false,
            warnings: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn fatal(&mut self, stage: Stage) {
        self.fatal = Some(stage);
    }

    pub fn cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Fold the tasks into the final summary
    pub fn finish(self, tasks: Vec<DeploymentTask>) -> RunSummary {
        let succeeded = count(&tasks, |o| matches!(o, TaskOutcome::Success));
        let failed = count(&tasks, |o| matches!(o, TaskOutcome::Failed(_)));
        let skipped = count(&tasks, |o| matches!(o, TaskOutcome::Skipped(_)));

        let status = match (self.fatal, self.cancelled) {
            (Some(stage), _) => RunStatus::Failed(stage),
            (None, true) => RunStatus::Cancelled,
            (None, false) if failed > 0 => RunStatus::Degraded,
            (None, false) => RunStatus::Ready,
        };

        RunSummary {
            run_id: self.run_id,
            mode: self.mode,
            status,
            total: tasks.len(),
            succeeded,
            failed,
            skipped,
            tasks,
            warnings: self.warnings,
            notes: self.notes,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

fn count(tasks: &[DeploymentTask], pred: impl Fn(&TaskOutcome) -> bool) -> usize {
    tasks.iter().filter(|t| pred(&t.outcome)).count()
}

impl RunSummary {
    /// Process exit code: zero only for a run without failures
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Failed(_) | RunStatus::Cancelled => 1,
            _ if self.failed > 0 => 1,
            _ => 0,
        }
    }

    /// Outcome for a host, if it took part in the run
    pub fn outcome_for(&self, host_id: &str) -> Option<&TaskOutcome> {
        self.tasks
            .iter()
            .find(|t| t.host == host_id)
            .map(|t| &t.outcome)
    }
}
