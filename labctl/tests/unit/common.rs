//! Scripted transport shared by the integration tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use labctl::deploy::fanout::{FanoutDeployer, FanoutOptions};
use labctl::deploy::retry::RetryPolicy;
use labctl::errors::ExecError;
use labctl::remote::command::Command;
use labctl::remote::executor::RemoteExecutor;
use labctl::remote::transport::{Output, Session, Transport};
use labctl::utils::CooldownOptions;
use tokio_util::sync::CancellationToken;

/// Scripted reply for a matching command
#[derive(Clone)]
pub enum Reply {
    Stdout(String),
    Exit(i32),
    Timeout,
    /// Cancel the run, then succeed
    CancelRun(CancellationToken),
}

#[derive(Debug, Clone)]
pub struct Logged {
    pub address: String,
    /// Redacted rendering
    pub display: String,
    /// What was sent to the remote shell
    pub remote_line: String,
    pub stdin: Option<String>,
}

struct Rule {
    address: String,
    contains: String,
    reply: Reply,
}

#[derive(Default)]
struct Script {
    rules: Mutex<Vec<Rule>>,
    unreachable: Mutex<Vec<String>>,
    log: Mutex<Vec<Logged>>,
    connects: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `reply` to commands on `address` whose display contains `contains`
    pub fn on(&self, address: &str, contains: &str, reply: Reply) -> &Self {
        self.script.rules.lock().unwrap().push(Rule {
            address: address.to_string(),
            contains: contains.to_string(),
            reply,
        });
        self
    }

    pub fn unreachable(&self, address: &str) -> &Self {
        self.script
            .unreachable
            .lock()
            .unwrap()
            .push(address.to_string());
        self
    }

    pub fn log(&self) -> Vec<Logged> {
        self.script.log.lock().unwrap().clone()
    }

    pub fn commands_to(&self, address: &str) -> Vec<Logged> {
        self.log()
            .into_iter()
            .filter(|l| l.address == address)
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.script.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(
        &self,
        address: &str,
        _timeout: Duration,
    ) -> Result<Box<dyn Session>, ExecError> {
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        if self.script.unreachable.lock().unwrap().iter().any(|a| a == address) {
            return Err(ExecError::Unreachable {
                address: address.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(Box::new(ScriptedSession {
            address: address.to_string(),
            script: self.script.clone(),
        }))
    }
}

struct ScriptedSession {
    address: String,
    script: Arc<Script>,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn run(&self, command: &Command, timeout: Duration) -> Result<Output, ExecError> {
        let display = command.to_string();
        self.script.log.lock().unwrap().push(Logged {
            address: self.address.clone(),
            display: display.clone(),
            remote_line: command.to_remote_line(),
            stdin: command
                .stdin_payload()
                .map(|p| String::from_utf8_lossy(p).into_owned()),
        });

        let reply = self
            .script
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.address == self.address && display.contains(&r.contains))
            .map(|r| r.reply.clone());

        let output = |stdout: String, exit_code: i32| Output {
            stdout,
            stderr: if exit_code == 0 {
                String::new()
            } else {
                "scripted failure".to_string()
            },
            exit_code,
        };

        match reply {
            None => Ok(output(String::new(), 0)),
            Some(Reply::Stdout(stdout)) => Ok(output(stdout, 0)),
            Some(Reply::Exit(code)) => Ok(output(String::new(), code)),
            Some(Reply::Timeout) => Err(ExecError::Timeout(timeout)),
            Some(Reply::CancelRun(cancel)) => {
                cancel.cancel();
                Ok(output(String::new(), 0))
            }
        }
    }
}

pub fn fast_options(parallelism: usize, max_attempts: u32) -> FanoutOptions {
    FanoutOptions {
        parallelism,
        command_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts,
            cooldown: CooldownOptions {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                multiplier: 2.0,
            },
        },
    }
}

pub fn deployer(transport: &ScriptedTransport, parallelism: usize) -> FanoutDeployer {
    FanoutDeployer::new(
        RemoteExecutor::new(Arc::new(transport.clone())),
        fast_options(parallelism, 1),
    )
}
