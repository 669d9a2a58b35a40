//! Command line parsing
//!
//! Arguments are a subcommand followed by `--key=value` flags; a bare
//! `--flag` means `true`.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::deploy::action::{Action, ContainerSpec};
use crate::deploy::flavor::NetworkSelection;
use crate::errors::OrchError;
use crate::logs::LogLevel;
use crate::models::host::{Host, Role};
use crate::remote::command::Command;

pub const USAGE: &str = "\
Usage: labctl <command> [--flag=value ...]

Commands:
  bootstrap-cluster  --control=ID@ADDR --workers=ID@ADDR,... [--network=flannel|calico|cilium|weave]
                     [--flavor=k3s|kubeadm|swarm] [--balancer=ID@ADDR]
  deploy             (--hosts=ID@ADDR,... | --role=worker) ACTION
  run                --host=ID@ADDR ACTION
  configure-balancer --balancer=ID@ADDR
  topology           show the persisted topology
  version            print version information

Actions:
  --image=IMAGE [--name=NAME] [--ports=8080:80,...] [--env=KEY=VALUE,...] [--restart=POLICY]
  --pull=IMAGE | --service=UNIT | --exec=\"PROGRAM ARGS...\"

Global flags:
  --config=PATH  --state-dir=PATH  --log-level=LEVEL  --json  --dry-run
  --parallelism=N  --timeout=SECONDS";

/// Raw arguments: the subcommand and its flags
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub command: Option<String>,
    pub flags: HashMap<String, String>,
}

/// Parse arguments, excluding the program name
pub fn parse_args<I>(args: I) -> CliArgs
where
    I: IntoIterator<Item = String>,
{
    let mut cli = CliArgs::default();
    for arg in args {
        if let Some(flag) = arg.strip_prefix("--") {
            match flag.split_once('=') {
                // Handle --key=value format
                Some((key, value)) => {
                    cli.flags.insert(key.to_string(), value.to_string());
                }
                // Handle standalone flags like --json
                None => {
                    cli.flags.insert(flag.to_string(), "true".to_string());
                }
            }
        } else if cli.command.is_none() {
            cli.command = Some(arg);
        }
    }
    cli
}

/// Flags shared by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalFlags {
    pub config: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub log_level: Option<LogLevel>,
    pub json: bool,
    pub dry_run: bool,
    pub parallelism: Option<usize>,
    pub timeout_secs: Option<u64>,
}

/// Bootstrap arguments; the flavor falls back to the configured default
#[derive(Debug, Clone)]
pub struct BootstrapArgs {
    pub control: Host,
    pub workers: Vec<Host>,
    pub network: NetworkSelection,
    pub flavor: Option<String>,
    pub balancer: Option<Host>,
}

/// Deploy targets: explicit hosts or every persisted host with a role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets {
    Hosts(Vec<Host>),
    Role(Role),
}

pub enum CliCommand {
    Bootstrap(BootstrapArgs),
    Deploy { targets: Targets, action: Action },
    ConfigureBalancer { balancer: Host },
    Topology,
    Version,
    Help,
}

impl CliArgs {
    fn get(&self, key: &str) -> Option<&str> {
        self.flags.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str, OrchError> {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| OrchError::ValidationError(format!("Missing required flag --{}", key)))
    }

    fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true") | Some("1") | Some("yes"))
    }

    fn parse_flag<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, OrchError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value.parse::<T>().map(Some).map_err(|_| {
                OrchError::ValidationError(format!("Invalid value for --{}: {}", key, value))
            }),
        }
    }

    pub fn global(&self) -> Result<GlobalFlags, OrchError> {
        let log_level = match self.get("log-level") {
            Some(level) => Some(level.parse::<LogLevel>().map_err(OrchError::ValidationError)?),
            None => None,
        };
        Ok(GlobalFlags {
            config: self.get("config").map(PathBuf::from),
            state_dir: self.get("state-dir").map(PathBuf::from),
            log_level,
            json: self.flag("json"),
            dry_run: self.flag("dry-run"),
            parallelism: self.parse_flag("parallelism")?,
            timeout_secs: self.parse_flag("timeout")?,
        })
    }

    pub fn command(&self) -> Result<CliCommand, OrchError> {
        if self.flag("version") {
            return Ok(CliCommand::Version);
        }
        if self.flag("help") {
            return Ok(CliCommand::Help);
        }

        match self.command.as_deref() {
            Some("bootstrap-cluster") | Some("bootstrap") => {
                let workers = match self.get("workers") {
                    Some(list) if !list.trim().is_empty() => Host::parse_list(list, Role::Worker)?,
                    _ => Vec::new(),
                };
                let balancer = match self.get("balancer") {
                    Some(spec) => Some(Host::parse(spec, Role::Balancer)?),
                    None => None,
                };
                Ok(CliCommand::Bootstrap(BootstrapArgs {
                    control: Host::parse(self.require("control")?, Role::ControlPlane)?,
                    workers,
                    network: NetworkSelection::parse(self.get("network")),
                    flavor: self.get("flavor").map(str::to_string),
                    balancer,
                }))
            }
            Some("deploy") => {
                let targets = match (self.get("hosts"), self.get("role")) {
                    (Some(list), None) => Targets::Hosts(Host::parse_list(list, Role::Worker)?),
                    (None, Some(role)) => Targets::Role(role.parse()?),
                    _ => {
                        return Err(OrchError::ValidationError(
                            "deploy needs exactly one of --hosts or --role".to_string(),
                        ))
                    }
                };
                Ok(CliCommand::Deploy {
                    targets,
                    action: self.action()?,
                })
            }
            Some("run") => {
                let host = Host::parse(self.require("host")?, Role::Standalone)?;
                Ok(CliCommand::Deploy {
                    targets: Targets::Hosts(vec![host]),
                    action: self.action()?,
                })
            }
            Some("configure-balancer") => Ok(CliCommand::ConfigureBalancer {
                balancer: Host::parse(self.require("balancer")?, Role::Balancer)?,
            }),
            Some("topology") => Ok(CliCommand::Topology),
            Some("version") => Ok(CliCommand::Version),
            Some("help") | None => Ok(CliCommand::Help),
            Some(other) => Err(OrchError::ValidationError(format!(
                "Unknown command: {}",
                other
            ))),
        }
    }

    fn action(&self) -> Result<Action, OrchError> {
        let chosen: Vec<&str> = ["image", "pull", "service", "exec"]
            .into_iter()
            .filter(|key| self.get(key).is_some())
            .collect();
        if chosen.len() != 1 {
            return Err(OrchError::ValidationError(
                "Give exactly one of --image, --pull, --service or --exec".to_string(),
            ));
        }

        let action = match chosen[0] {
            "image" => {
                let mut spec = ContainerSpec::new(self.require("image")?);
                spec.name = self.get("name").map(str::to_string);
                spec.ports = split_list(self.get("ports"));
                spec.env = split_list(self.get("env"))
                    .into_iter()
                    .map(|pair| match pair.split_once('=') {
                        Some((k, v)) => Ok((k.to_string(), v.to_string())),
                        None => Err(OrchError::ValidationError(format!(
                            "Invalid --env entry '{}', expected KEY=VALUE",
                            pair
                        ))),
                    })
                    .collect::<Result<_, _>>()?;
                if let Some(restart) = self.get("restart") {
                    spec.restart = restart.to_string();
                }
                Action::RunContainer(spec)
            }
            "pull" => Action::PullImage {
                image: self.require("pull")?.to_string(),
            },
            "service" => Action::StartService {
                name: self.require("service")?.to_string(),
            },
            _ => {
                // Split on whitespace, no shell: each word is one argument
                let mut words = self.require("exec")?.split_whitespace();
                let program = words.next().unwrap_or_default();
                Action::Exec(Command::new(program).args(words))
            }
        };
        action.validate()?;
        Ok(action)
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
