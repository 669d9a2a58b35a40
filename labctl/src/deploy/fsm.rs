//! Finite State Machine for cluster bootstrap

use serde::{Deserialize, Serialize};

use crate::models::task::Stage;

/// Bootstrap state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapState {
    /// Nothing has run yet
    Init,

    /// Control plane initialized
    ControlPlaneUp,

    /// Join credential recorded
    CredentialIssued,

    /// Worker joins in flight
    WorkersJoining,

    /// All workers settled (some may have failed)
    Ready,

    /// A control-plane stage failed; nothing later ran
    Failed(Stage),

    /// Stopped by a shutdown signal
    Cancelled,
}

impl BootstrapState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BootstrapState::Ready | BootstrapState::Failed(_) | BootstrapState::Cancelled
        )
    }

    /// Stage being worked on while in this state
    fn stage_in_progress(&self) -> Option<Stage> {
        match self {
            BootstrapState::Init => Some(Stage::Init),
            BootstrapState::ControlPlaneUp => Some(Stage::CredentialIssued),
            BootstrapState::CredentialIssued | BootstrapState::WorkersJoining => {
                Some(Stage::WorkersJoining)
            }
            _ => None,
        }
    }
}

/// Bootstrap event
#[derive(Debug, Clone)]
pub enum BootstrapEvent {
    /// Control plane init command succeeded
    ControlPlaneInitialized,

    /// Join credential recorded
    CredentialIssued,

    /// Worker fan-out started
    JoinStarted,

    /// Every worker reached a terminal outcome
    WorkersSettled,

    /// The stage in progress failed
    StageFailed(String),

    /// Shutdown requested
    Cancel,
}

/// Bootstrap FSM
#[derive(Debug, Clone)]
pub struct BootstrapFsm {
    state: BootstrapState,
    error: Option<String>,
    history: Vec<BootstrapState>,
}

impl BootstrapFsm {
    /// Create a new FSM in the init state
    pub fn new() -> Self {
        Self {
            state: BootstrapState::Init,
            error: None,
            history: vec![BootstrapState::Init],
        }
    }

    /// Get current state
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Every state entered, in order
    pub fn history(&self) -> &[BootstrapState] {
        &self.history
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: BootstrapEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (BootstrapState::Init, BootstrapEvent::ControlPlaneInitialized) => {
                BootstrapState::ControlPlaneUp
            }
            (BootstrapState::ControlPlaneUp, BootstrapEvent::CredentialIssued) => {
                BootstrapState::CredentialIssued
            }
            (BootstrapState::CredentialIssued, BootstrapEvent::JoinStarted) => {
                BootstrapState::WorkersJoining
            }
            (BootstrapState::WorkersJoining, BootstrapEvent::WorkersSettled) => {
                BootstrapState::Ready
            }

            (state, BootstrapEvent::StageFailed(err)) if !state.is_terminal() => {
                self.error = Some(err.clone());
                match state.stage_in_progress() {
                    Some(stage) => BootstrapState::Failed(stage),
                    None => BootstrapState::Failed(Stage::Init),
                }
            }
            (state, BootstrapEvent::Cancel) if !state.is_terminal() => BootstrapState::Cancelled,

            // Invalid transitions
            (state, event) => {
                return Err(format!(
                    "Invalid transition: {:?} -> {:?}",
                    state, event
                ));
            }
        };

        self.state = new_state;
        self.history.push(new_state);
        Ok(())
    }
}

impl Default for BootstrapFsm {
    fn default() -> Self {
        Self::new()
    }
}
