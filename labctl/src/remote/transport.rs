//! Remote transport seam

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ExecError;
use crate::remote::command::Command;

/// Captured result of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl Output {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty stdout line, trimmed
    pub fn last_line(&self) -> Option<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
    }
}

/// An established connection to one host
#[async_trait]
pub trait Session: Send + Sync {
    /// Run a command. A non-zero exit is reported in `Output`, not as an error.
    async fn run(&self, command: &Command, timeout: Duration) -> Result<Output, ExecError>;
}

/// Connects to hosts by address
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, ExecError>;
}
