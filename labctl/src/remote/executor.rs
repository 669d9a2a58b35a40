//! Remote executor

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::ExecError;
use crate::models::host::Host;
use crate::remote::command::Command;
use crate::remote::transport::{Output, Transport};

/// Runs one command on one host under a single deadline.
///
/// The deadline covers connecting and running. Failures are returned as-is;
/// the executor never retries.
#[derive(Clone)]
pub struct RemoteExecutor {
    transport: Arc<dyn Transport>,
}

impl RemoteExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn execute(
        &self,
        host: &Host,
        command: &Command,
        timeout: Duration,
    ) -> Result<Output, ExecError> {
        if command.is_empty() {
            return Err(ExecError::InvalidCommand(
                "command has no program".to_string(),
            ));
        }
        if host.address.trim().is_empty() {
            return Err(ExecError::Unreachable {
                address: host.address.clone(),
                reason: format!("host {} has no address", host.id),
            });
        }

        let started = Instant::now();

        let connect = self.transport.connect(&host.address, timeout);
        let session = match tokio::time::timeout(timeout, connect).await {
            Ok(session) => session?,
            Err(_) => {
                return Err(ExecError::Unreachable {
                    address: host.address.clone(),
                    reason: format!("no connection within {:?}", timeout),
                })
            }
        };

        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(ExecError::Timeout(timeout));
        }

        debug!("[{}] running: {}", host.id, command);
        let output = match tokio::time::timeout(remaining, session.run(command, remaining)).await {
            Ok(result) => result?,
            Err(_) => return Err(ExecError::Timeout(timeout)),
        };

        if !output.success() {
            warn!(
                "[{}] command exited with {}: {}",
                host.id, output.exit_code, command
            );
            return Err(ExecError::NonZeroExit {
                code: output.exit_code,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }
}
