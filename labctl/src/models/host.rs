//! Host model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::OrchError;

/// Role a host plays in a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    ControlPlane,
    Worker,
    Balancer,
    Standalone,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ControlPlane => "control-plane",
            Role::Worker => "worker",
            Role::Balancer => "balancer",
            Role::Standalone => "standalone",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = OrchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "control-plane" | "controlplane" | "control" | "master" => Ok(Role::ControlPlane),
            "worker" | "node" => Ok(Role::Worker),
            "balancer" | "lb" | "load-balancer" => Ok(Role::Balancer),
            "standalone" => Ok(Role::Standalone),
            _ => Err(OrchError::ValidationError(format!("Unknown role: {}", s))),
        }
    }
}

/// A deployment target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Unique host ID within a topology
    pub id: String,

    /// Network address (hostname or IP)
    pub address: String,

    /// Assigned role
    pub role: Role,

    /// Whether the host answered during the last run
    #[serde(default = "default_reachable")]
    pub reachable: bool,
}

fn default_reachable() -> bool {
    true
}

impl Host {
    /// Create a new host, assumed reachable until a run says otherwise
    pub fn new(id: impl Into<String>, address: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            role,
            reachable: true,
        }
    }

    /// Parse `id@address` or a bare `address` (the address doubles as the id)
    pub fn parse(spec: &str, role: Role) -> Result<Self, OrchError> {
        let spec = spec.trim();
        let (id, address) = match spec.split_once('@') {
            Some((id, address)) => (id.trim(), address.trim()),
            None => (spec, spec),
        };

        if id.is_empty() || address.is_empty() {
            return Err(OrchError::ValidationError(format!(
                "Invalid host '{}', expected id@address or address",
                spec
            )));
        }
        if address.chars().any(|c| c.is_whitespace()) {
            return Err(OrchError::ValidationError(format!(
                "Invalid host address '{}'",
                address
            )));
        }

        Ok(Self::new(id, address, role))
    }

    /// Parse a comma separated list of host specs
    pub fn parse_list(specs: &str, role: Role) -> Result<Vec<Self>, OrchError> {
        specs
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| Self::parse(s, role))
            .collect()
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id == self.address {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{}@{}", self.id, self.address)
        }
    }
}
