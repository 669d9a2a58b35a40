//! Topology registry

use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::errors::OrchError;
use crate::models::host::{Host, Role};

/// Hosts of one orchestration run and their roles.
///
/// Insertion order is preserved and is the order every fan-out uses.
/// At most one host holds [`Role::ControlPlane`]. A failing mutation leaves
/// the registry exactly as it was.
#[derive(Debug, Default)]
pub struct TopologyRegistry {
    hosts: RwLock<Vec<Host>>,
}

impl TopologyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from persisted hosts, enforcing the same invariants as `add_host`
    pub fn from_hosts(hosts: Vec<Host>) -> Result<Self, OrchError> {
        let registry = Self::new();
        for host in hosts {
            registry.add_host(host)?;
        }
        Ok(registry)
    }

    pub fn add_host(&self, host: Host) -> Result<(), OrchError> {
        let mut hosts = self.hosts.write().unwrap_or_else(|e| e.into_inner());

        if hosts.iter().any(|h| h.id == host.id) {
            return Err(OrchError::ValidationError(format!(
                "host {} is already registered",
                host.id
            )));
        }
        if host.role == Role::ControlPlane {
            if let Some(existing) = hosts.iter().find(|h| h.role == Role::ControlPlane) {
                return Err(control_plane_conflict(&existing.id, &host.id));
            }
        }

        debug!("Registered {} as {}", host, host.role);
        hosts.push(host);
        Ok(())
    }

    pub fn set_role(&self, id: &str, role: Role) -> Result<(), OrchError> {
        let mut hosts = self.hosts.write().unwrap_or_else(|e| e.into_inner());

        if role == Role::ControlPlane {
            if let Some(existing) = hosts
                .iter()
                .find(|h| h.role == Role::ControlPlane && h.id != id)
            {
                return Err(control_plane_conflict(&existing.id, id));
            }
        }

        let host = hosts
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| OrchError::NotFound(format!("host {}", id)))?;
        host.role = role;
        Ok(())
    }

    pub fn set_reachable(&self, id: &str, reachable: bool) -> Result<(), OrchError> {
        let mut hosts = self.hosts.write().unwrap_or_else(|e| e.into_inner());
        let host = hosts
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| OrchError::NotFound(format!("host {}", id)))?;
        host.reachable = reachable;
        Ok(())
    }

    /// Hosts holding `role`, in insertion order.
    ///
    /// The sequence is lazy over a snapshot taken now; clone it to iterate again.
    pub fn hosts_by_role(&self, role: Role) -> HostsByRole {
        HostsByRole {
            snapshot: self.snapshot(),
            role,
            pos: 0,
        }
    }

    /// True when every registered host answered during the last run
    pub fn all_reachable(&self) -> bool {
        let hosts = self.hosts.read().unwrap_or_else(|e| e.into_inner());
        hosts.iter().all(|h| h.reachable)
    }

    pub fn get(&self, id: &str) -> Option<Host> {
        let hosts = self.hosts.read().unwrap_or_else(|e| e.into_inner());
        hosts.iter().find(|h| h.id == id).cloned()
    }

    pub fn control_plane(&self) -> Option<Host> {
        self.hosts_by_role(Role::ControlPlane).next()
    }

    pub fn hosts(&self) -> Vec<Host> {
        self.snapshot().to_vec()
    }

    pub fn len(&self) -> usize {
        self.hosts.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<[Host]> {
        let hosts = self.hosts.read().unwrap_or_else(|e| e.into_inner());
        Arc::from(hosts.as_slice())
    }
}

fn control_plane_conflict(existing: &str, requested: &str) -> OrchError {
    OrchError::RoleConflict(format!(
        "{} is already the control-plane, cannot assign {}",
        existing, requested
    ))
}

/// Insertion-ordered hosts of one role
#[derive(Debug, Clone)]
pub struct HostsByRole {
    snapshot: Arc<[Host]>,
    role: Role,
    pos: usize,
}

impl Iterator for HostsByRole {
    type Item = Host;

    fn next(&mut self) -> Option<Host> {
        while let Some(host) = self.snapshot.get(self.pos) {
            self.pos += 1;
            if host.role == self.role {
                return Some(host.clone());
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.snapshot.len().saturating_sub(self.pos)))
    }
}
