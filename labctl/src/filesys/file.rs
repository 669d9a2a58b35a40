//! JSON state files

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::OrchError;

#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, OrchError> {
        let contents = fs::read_to_string(&self.path).await?;
        serde_json::from_str(&contents).map_err(|e| {
            OrchError::ConfigError(format!("{} is not valid: {}", self.path.display(), e))
        })
    }

    /// Replace the file contents, creating parent directories as needed
    pub async fn write_string(&self, contents: &str) -> Result<(), OrchError> {
        self.ensure_parent().await?;
        fs::write(&self.path, contents).await?;
        Ok(())
    }

    /// Write JSON readable by the owner only (0o600 on Unix).
    ///
    /// Content goes to a sibling `.tmp` file created with restricted
    /// permissions, which is then renamed over the target. Readers never see
    /// a half-written file.
    pub async fn write_private_json<T: Serialize>(&self, value: &T) -> Result<(), OrchError> {
        let contents = serde_json::to_string_pretty(value)?;
        self.ensure_parent().await?;

        let temp_path = self.path.with_extension("tmp");
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&temp_path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        // The target may have existed with wider permissions
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        Ok(())
    }

    async fn ensure_parent(&self) -> Result<(), OrchError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
