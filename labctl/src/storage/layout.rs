//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::OrchError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Environment variable overriding the state directory
pub const HOME_ENV_VAR: &str = "LABCTL_HOME";

/// Where labctl keeps its settings and persisted run state
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Get the persisted topology file path
    pub fn topology_file(&self) -> File {
        File::new(self.base_dir.join("topology.json"))
    }

    /// Get the persisted credentials file path
    pub fn credentials_file(&self) -> File {
        File::new(self.base_dir.join("credentials.json"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Create the state and log directories, owner-only
    pub async fn setup(&self) -> Result<(), OrchError> {
        Dir::new(self.base_dir.clone()).create_private().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        if let Some(dir) = std::env::var_os(HOME_ENV_VAR) {
            return Self::new(dir);
        }

        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".labctl");

        Self::new(base_dir)
    }
}
