//! Join credential model

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::errors::OrchError;
use crate::utils::sha256_hash;

/// Kind of join credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialKind {
    ClusterJoin,
    SwarmWorker,
    SwarmManager,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::ClusterJoin => "cluster-join",
            CredentialKind::SwarmWorker => "swarm-worker",
            CredentialKind::SwarmManager => "swarm-manager",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialKind {
    type Err = OrchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cluster-join" => Ok(CredentialKind::ClusterJoin),
            "swarm-worker" => Ok(CredentialKind::SwarmWorker),
            "swarm-manager" => Ok(CredentialKind::SwarmManager),
            _ => Err(OrchError::ValidationError(format!(
                "Unknown credential kind: {}",
                s
            ))),
        }
    }
}

/// A join credential issued by a control-plane host.
///
/// Immutable once created. The secret is shared read-only between every
/// join that consumes it and only leaves the process inside a remote command.
#[derive(Clone)]
pub struct Credential {
    kind: CredentialKind,
    secret: Arc<SecretString>,
    issued_by: String,
    issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(kind: CredentialKind, secret: SecretString, issued_by: impl Into<String>) -> Self {
        Self {
            kind,
            secret: Arc::new(secret),
            issued_by: issued_by.into(),
            issued_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    pub fn issued_by(&self) -> &str {
        &self.issued_by
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Expose the secret; callers must only hand it to a secret command argument
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    /// Identifier that is safe to log: kind plus a short digest of the secret
    pub fn redacted_id(&self) -> String {
        let digest = sha256_hash(self.expose().as_bytes());
        format!("{}:{}", self.kind, &digest[..12])
    }

    /// Human-readable export without the secret
    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            kind: self.kind,
            issued_by: self.issued_by.clone(),
            issued_at: self.issued_at,
            redacted_id: self.redacted_id(),
        }
    }

    /// Full record for the owner-only credentials file
    pub fn to_record(&self) -> CredentialRecord {
        CredentialRecord {
            kind: self.kind,
            secret: self.expose().to_string(),
            issued_by: self.issued_by.clone(),
            issued_at: self.issued_at,
        }
    }

    pub fn from_record(record: CredentialRecord) -> Self {
        Self {
            kind: record.kind,
            secret: Arc::new(SecretString::from(record.secret)),
            issued_by: record.issued_by,
            issued_at: record.issued_at,
        }
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.issued_by == other.issued_by
            && self.issued_at == other.issued_at
            && self.expose() == other.expose()
    }
}

impl Eq for Credential {}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("id", &self.redacted_id())
            .field("issued_by", &self.issued_by)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted_id())
    }
}

/// Credential export safe for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSummary {
    pub kind: CredentialKind,
    pub issued_by: String,
    pub issued_at: DateTime<Utc>,
    pub redacted_id: String,
}

/// Persisted credential, only ever written to an owner-only file
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub kind: CredentialKind,
    pub secret: String,
    pub issued_by: String,
    pub issued_at: DateTime<Utc>,
}
