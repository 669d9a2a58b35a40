//! Deployable actions and the remote steps they expand to

use std::fmt;

use crate::errors::OrchError;
use crate::remote::command::Command;

/// One remote command in an action's sequence
#[derive(Clone)]
pub struct Step {
    pub command: Command,

    /// A non-zero exit does not fail the task (e.g. removing a container
    /// that may not exist)
    pub tolerate_failure: bool,
}

impl Step {
    pub fn required(command: Command) -> Self {
        Self {
            command,
            tolerate_failure: false,
        }
    }

    pub fn optional(command: Command) -> Self {
        Self {
            command,
            tolerate_failure: true,
        }
    }
}

/// Render steps for a task payload, secrets redacted
pub fn render_steps(steps: &[Step]) -> String {
    steps
        .iter()
        .map(|s| s.command.to_string())
        .collect::<Vec<_>>()
        .join(" && ")
}

/// A container to (re)create on a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub name: Option<String>,
    /// `host:container[/proto]` mappings
    pub ports: Vec<String>,
    pub env: Vec<(String, String)>,
    pub restart: String,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: None,
            ports: Vec::new(),
            env: Vec::new(),
            restart: "unless-stopped".to_string(),
        }
    }

    /// Explicit name, or the image's last path segment without tag or digest
    pub fn container_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let last = self.image.rsplit('/').next().unwrap_or(&self.image);
        let base = last.split(['@', ':']).next().unwrap_or(last);
        if base.is_empty() {
            "container".to_string()
        } else {
            base.to_string()
        }
    }

    pub fn validate(&self) -> Result<(), OrchError> {
        if self.image.trim().is_empty() || self.image.starts_with('-') {
            return Err(OrchError::ValidationError(format!(
                "Invalid image '{}'",
                self.image
            )));
        }

        let name = self.container_name();
        let mut chars = name.chars();
        let valid_name = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !valid_name {
            return Err(OrchError::ValidationError(format!(
                "Invalid container name '{}'",
                name
            )));
        }

        for port in &self.ports {
            if !is_port_mapping(port) {
                return Err(OrchError::ValidationError(format!(
                    "Invalid port mapping '{}', expected host:container[/tcp|udp]",
                    port
                )));
            }
        }

        for (key, _) in &self.env {
            if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(OrchError::ValidationError(format!(
                    "Invalid environment variable name '{}'",
                    key
                )));
            }
        }
        Ok(())
    }
}

fn is_port_mapping(spec: &str) -> bool {
    let (ports, proto) = match spec.split_once('/') {
        Some((ports, proto)) => (ports, Some(proto)),
        None => (spec, None),
    };
    if !matches!(proto, None | Some("tcp") | Some("udp")) {
        return false;
    }
    let is_port = |p: &str| p.parse::<u16>().is_ok_and(|n| n > 0);
    match ports.split_once(':') {
        Some((host, container)) => is_port(host) && is_port(container),
        None => is_port(ports),
    }
}

/// What to run on every target host
#[derive(Clone)]
pub enum Action {
    /// Pull the image and replace the named container
    RunContainer(ContainerSpec),
    PullImage { image: String },
    /// (Re)start a systemd unit
    StartService { name: String },
    /// An arbitrary command
    Exec(Command),
}

impl Action {
    /// Short label for summaries and logs
    pub fn label(&self) -> String {
        match self {
            Action::RunContainer(spec) => format!("run {}", spec.image),
            Action::PullImage { image } => format!("pull {}", image),
            Action::StartService { name } => format!("service {}", name),
            Action::Exec(command) => format!("exec {}", command.program()),
        }
    }

    pub fn validate(&self) -> Result<(), OrchError> {
        match self {
            Action::RunContainer(spec) => spec.validate(),
            Action::PullImage { image } if image.trim().is_empty() || image.starts_with('-') => Err(
                OrchError::ValidationError(format!("Invalid image '{}'", image)),
            ),
            Action::StartService { name } if name.trim().is_empty() || name.starts_with('-') => Err(
                OrchError::ValidationError(format!("Invalid service name '{}'", name)),
            ),
            Action::Exec(command) if command.is_empty() => Err(OrchError::ValidationError(
                "Exec action needs a command".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Remote steps, run in order; the first failing required step ends the task
    pub fn steps(&self) -> Vec<Step> {
        match self {
            Action::RunContainer(spec) => {
                let name = spec.container_name();
                let mut run = Command::new("docker").args([
                    "run",
                    "-d",
                    "--name",
                    name.as_str(),
                    "--restart",
                    spec.restart.as_str(),
                ]);
                for port in &spec.ports {
                    run = run.args(["-p", port.as_str()]);
                }
                for (key, value) in &spec.env {
                    run = run.arg("-e").arg(format!("{}={}", key, value));
                }
                run = run.arg(spec.image.as_str());

                vec![
                    Step::required(Command::new("docker").args(["pull", spec.image.as_str()])),
                    Step::optional(Command::new("docker").args(["rm", "-f", name.as_str()])),
                    Step::required(run),
                ]
            }
            Action::PullImage { image } => {
                vec![Step::required(
                    Command::new("docker").args(["pull", image.as_str()]),
                )]
            }
            Action::StartService { name } => {
                vec![Step::required(
                    Command::new("systemctl").args(["restart", name.as_str()]),
                )]
            }
            Action::Exec(command) => vec![Step::required(command.clone())],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
