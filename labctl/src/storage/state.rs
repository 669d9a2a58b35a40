//! Persisted topology and credential state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::authn::credential_mngr::CredentialManager;
use crate::errors::OrchError;
use crate::filesys::file::File;
use crate::models::credential::{CredentialRecord, CredentialSummary};
use crate::models::host::Host;
use crate::topology::registry::TopologyRegistry;

const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct TopologyFile {
    version: u32,
    updated_at: DateTime<Utc>,
    hosts: Vec<Host>,
}

#[derive(Serialize, Deserialize)]
struct CredentialsFile {
    version: u32,
    updated_at: DateTime<Utc>,
    credentials: Vec<CredentialRecord>,
}

/// Human-readable state, secrets redacted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateExport {
    pub hosts: Vec<Host>,
    pub credentials: Vec<CredentialSummary>,
}

fn check_version(version: u32, file: &File) -> Result<(), OrchError> {
    if version != STATE_VERSION {
        return Err(OrchError::ConfigError(format!(
            "{} has unsupported state version {}",
            file.path().display(),
            version
        )));
    }
    Ok(())
}

/// Load the persisted topology; a missing file yields an empty registry
pub async fn load_topology(file: &File) -> Result<TopologyRegistry, OrchError> {
    if !file.exists().await {
        debug!("No topology at {}", file.path().display());
        return Ok(TopologyRegistry::new());
    }
    let state: TopologyFile = file.read_json().await?;
    check_version(state.version, file)?;
    TopologyRegistry::from_hosts(state.hosts)
}

pub async fn save_topology(file: &File, registry: &TopologyRegistry) -> Result<(), OrchError> {
    let state = TopologyFile {
        version: STATE_VERSION,
        updated_at: Utc::now(),
        hosts: registry.hosts(),
    };
    file.write_private_json(&state).await
}

/// Load persisted credentials; a missing file yields an empty manager
pub async fn load_credentials(file: &File) -> Result<CredentialManager, OrchError> {
    if !file.exists().await {
        return Ok(CredentialManager::new());
    }
    let state: CredentialsFile = file.read_json().await?;
    check_version(state.version, file)?;
    Ok(CredentialManager::from_records(state.credentials))
}

pub async fn save_credentials(
    file: &File,
    credentials: &CredentialManager,
) -> Result<(), OrchError> {
    let state = CredentialsFile {
        version: STATE_VERSION,
        updated_at: Utc::now(),
        credentials: credentials.to_records(),
    };
    file.write_private_json(&state).await
}

pub fn export(registry: &TopologyRegistry, credentials: &CredentialManager) -> StateExport {
    StateExport {
        hosts: registry.hosts(),
        credentials: credentials.export_redacted(),
    }
}
