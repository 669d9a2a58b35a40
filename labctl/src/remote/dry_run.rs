//! Transport that only reports what it would run

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::errors::ExecError;
use crate::remote::command::Command;
use crate::remote::transport::{Output, Session, Transport};

/// Placeholder a dry-run swarm manager prints in place of its join token
pub const DRY_RUN_SECRET: &str = "dryrun.0000000000000000";

#[derive(Debug, Clone, Default)]
pub struct DryRunTransport;

#[async_trait]
impl Transport for DryRunTransport {
    async fn connect(
        &self,
        address: &str,
        _timeout: Duration,
    ) -> Result<Box<dyn Session>, ExecError> {
        Ok(Box::new(DryRunSession {
            address: address.to_string(),
        }))
    }
}

struct DryRunSession {
    address: String,
}

#[async_trait]
impl Session for DryRunSession {
    async fn run(&self, command: &Command, _timeout: Duration) -> Result<Output, ExecError> {
        match command.stdin_payload() {
            Some(payload) => info!(
                "[dry-run] {}: {} (stdin: {} bytes)",
                self.address,
                command,
                payload.len()
            ),
            None => info!("[dry-run] {}: {}", self.address, command),
        }

        Ok(Output {
            stdout: format!("{}\n", DRY_RUN_SECRET),
            stderr: String::new(),
            exit_code: 0,
        })
    }
}
