//! Directory helpers

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::OrchError;

#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True only for an existing directory
    pub async fn exists(&self) -> bool {
        matches!(fs::metadata(&self.path).await, Ok(meta) if meta.is_dir())
    }

    /// Create the directory and any missing parents
    pub async fn create(&self) -> Result<(), OrchError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Like `create`, then restrict the directory to its owner (0o700 on Unix).
    /// An existing directory is tightened too.
    pub async fn create_private(&self) -> Result<(), OrchError> {
        self.create().await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o700)).await?;
        }
        Ok(())
    }
}
