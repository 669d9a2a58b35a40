//! Join credential manager

use std::collections::BTreeMap;
use std::sync::RwLock;

use secrecy::SecretString;
use tracing::{debug, info};

use crate::authn::secret::generate_secret;
use crate::errors::OrchError;
use crate::models::credential::{Credential, CredentialKind, CredentialRecord, CredentialSummary};
use crate::models::host::{Host, Role};

/// Holds the join credentials of one orchestration run.
///
/// One credential per kind. Issuing is idempotent per `(kind, issuer)`; a
/// different issuer for a kind that already has a credential is rejected.
#[derive(Default)]
pub struct CredentialManager {
    credentials: RwLock<BTreeMap<CredentialKind, Credential>>,
}

impl CredentialManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore credentials persisted by an earlier run
    pub fn from_records(records: Vec<CredentialRecord>) -> Self {
        let credentials = records
            .into_iter()
            .map(|r| (r.kind, Credential::from_record(r)))
            .collect();
        Self {
            credentials: RwLock::new(credentials),
        }
    }

    /// Mint a credential of `kind` for `issuer`, or return the one it already issued
    pub fn issue(&self, kind: CredentialKind, issuer: &Host) -> Result<Credential, OrchError> {
        self.insert_with(kind, issuer, || generate_secret(kind))
    }

    /// Register a secret produced by the control plane itself
    pub fn record(
        &self,
        kind: CredentialKind,
        issuer: &Host,
        secret: SecretString,
    ) -> Result<Credential, OrchError> {
        self.insert_with(kind, issuer, || secret)
    }

    fn insert_with(
        &self,
        kind: CredentialKind,
        issuer: &Host,
        secret: impl FnOnce() -> SecretString,
    ) -> Result<Credential, OrchError> {
        if issuer.role != Role::ControlPlane {
            return Err(OrchError::RoleConflict(format!(
                "host {} is a {} and cannot issue {} credentials",
                issuer.id, issuer.role, kind
            )));
        }

        let mut credentials = self
            .credentials
            .write()
            .unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = credentials.get(&kind) {
            if existing.issued_by() == issuer.id {
                debug!("Reusing {} issued by {}", existing, issuer.id);
                return Ok(existing.clone());
            }
            return Err(OrchError::RoleConflict(format!(
                "{} credential already issued by {}, refusing reissue by {}",
                kind,
                existing.issued_by(),
                issuer.id
            )));
        }

        let credential = Credential::new(kind, secret(), issuer.id.clone());
        info!("Issued {} by {}", credential, issuer.id);
        credentials.insert(kind, credential.clone());
        Ok(credential)
    }

    /// Drop the credential of `kind` when the control plane never accepted it
    pub fn revoke(&self, kind: CredentialKind) -> Option<Credential> {
        let mut credentials = self
            .credentials
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let revoked = credentials.remove(&kind);
        if let Some(credential) = &revoked {
            info!("Revoked {}", credential);
        }
        revoked
    }

    /// Credential of `kind`, or `None` while the control plane is not ready
    pub fn get(&self, kind: CredentialKind) -> Option<Credential> {
        let credentials = self.credentials.read().unwrap_or_else(|e| e.into_inner());
        credentials.get(&kind).cloned()
    }

    /// Like [`get`](Self::get) but failing with `CredentialMissing`
    pub fn require(&self, kind: CredentialKind) -> Result<Credential, OrchError> {
        self.get(kind)
            .ok_or_else(|| OrchError::CredentialMissing(kind.to_string()))
    }

    pub fn len(&self) -> usize {
        self.credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Export without secrets, ordered by kind
    pub fn export_redacted(&self) -> Vec<CredentialSummary> {
        let credentials = self.credentials.read().unwrap_or_else(|e| e.into_inner());
        credentials.values().map(Credential::summary).collect()
    }

    /// Full records for the owner-only credentials file
    pub fn to_records(&self) -> Vec<CredentialRecord> {
        let credentials = self.credentials.read().unwrap_or_else(|e| e.into_inner());
        credentials.values().map(Credential::to_record).collect()
    }
}
