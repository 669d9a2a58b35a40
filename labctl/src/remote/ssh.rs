//! SSH transport backed by the system OpenSSH client
//!
//! Reachability is probed with a plain TCP connect to the SSH port before the
//! client is spawned, so an unreachable host is reported as such instead of
//! as a generic ssh failure. Exit code 255 is ambiguous: the client uses it
//! for its own failures, but a remote command may exit 255 too. Only stderr
//! written by the client itself turns it into a connection failure.

use std::net::SocketAddr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::errors::ExecError;
use crate::remote::command::Command;
use crate::remote::transport::{Output, Session, Transport};
use crate::storage::settings::SshSettings;

/// Exit code the OpenSSH client uses for its own failures
const SSH_CLIENT_ERROR: i32 = 255;

/// Client messages meaning the remote command never started
const CONNECT_FAILURES: &[&str] = &[
    "Permission denied (",
    "Connection refused",
    "Could not resolve",
    "Connection timed out",
    "Host key verification failed",
];

/// Client messages meaning the link dropped after the command started
const LINK_DROPS: &[&str] = &[
    "closed by remote host",
    "Broken pipe",
    "client_loop:",
    "Connection reset",
];

/// Transport that shells out to `ssh` in batch mode
#[derive(Debug, Clone)]
pub struct SshTransport {
    settings: SshSettings,
}

impl SshTransport {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, ExecError> {
        let unreachable = |reason: String| ExecError::Unreachable {
            address: address.to_string(),
            reason,
        };

        let probe = async {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((address, self.settings.port))
                .await
                .map_err(|e| unreachable(format!("cannot resolve: {}", e)))?
                .collect();

            let mut last_err = unreachable("no addresses resolved".to_string());
            for addr in addrs {
                match TcpStream::connect(addr).await {
                    Ok(_) => return Ok(()),
                    Err(e) => last_err = unreachable(format!("{}: {}", addr, e)),
                }
            }
            Err(last_err)
        };

        match tokio::time::timeout(timeout, probe).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(unreachable(format!("no answer within {:?}", timeout))),
        }

        debug!("SSH port open on {}", address);
        Ok(Box::new(SshSession {
            address: address.to_string(),
            settings: self.settings.clone(),
        }))
    }
}

/// One host reachable over SSH
pub struct SshSession {
    address: String,
    settings: SshSettings,
}

impl SshSession {
    fn destination(&self) -> String {
        match &self.settings.user {
            Some(user) => format!("{}@{}", user, self.address),
            None => self.address.clone(),
        }
    }

    /// Arguments passed to the local `ssh` binary
    pub fn ssh_args(&self, command: &Command, timeout: Duration) -> Vec<String> {
        let connect_timeout = self
            .settings
            .connect_timeout_secs
            .min(timeout.as_secs().max(1));

        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", connect_timeout),
            "-p".to_string(),
            self.settings.port.to_string(),
        ];
        if let Some(identity) = &self.settings.identity_file {
            args.push("-i".to_string());
            args.push(identity.clone());
        }
        for option in &self.settings.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args.push(self.destination());
        args.push("--".to_string());
        args.push(command.to_remote_line());
        args
    }
}

#[async_trait]
impl Session for SshSession {
    async fn run(&self, command: &Command, timeout: Duration) -> Result<Output, ExecError> {
        debug!("ssh {}: {}", self.address, command);

        let mut child = tokio::process::Command::new(&self.settings.program)
            .args(self.ssh_args(command, timeout))
            .stdin(if command.stdin_payload().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecError::Transport(format!("failed to spawn {}: {}", self.settings.program, e))
            })?;

        let run = async {
            if let (Some(payload), Some(mut stdin)) = (command.stdin_payload(), child.stdin.take())
            {
                stdin.write_all(payload).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ExecError::Transport(e.to_string())),
            Err(_) => return Err(ExecError::Timeout(timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        match output.status.code() {
            Some(SSH_CLIENT_ERROR) => match classify_client_error(&self.address, &stderr) {
                Some(e) => Err(e),
                None => Ok(Output {
                    stdout,
                    stderr,
                    exit_code: SSH_CLIENT_ERROR,
                }),
            },
            Some(code) => Ok(Output {
                stdout,
                stderr,
                exit_code: code,
            }),
            // Killed by a signal
            None => Ok(Output {
                stdout,
                stderr,
                exit_code: -1,
            }),
        }
    }
}

/// Error for an ssh exit of 255 whose stderr came from the client, or `None`
/// when the remote command itself exited 255
fn classify_client_error(address: &str, stderr: &str) -> Option<ExecError> {
    let message = stderr.trim();
    let last = message.lines().last().unwrap_or_default();

    let from_client = message.lines().any(|line| line.starts_with("ssh:"));
    if from_client || CONNECT_FAILURES.iter().any(|m| message.contains(m)) {
        return Some(ExecError::Unreachable {
            address: address.to_string(),
            reason: message.to_string(),
        });
    }
    if LINK_DROPS.iter().any(|m| last.contains(m)) {
        return Some(ExecError::Transport(format!(
            "connection to {} lost: {}",
            address, last
        )));
    }
    None
}
