//! Application configuration options

use std::time::Duration;

use crate::app::cli::GlobalFlags;
use crate::deploy::fanout::FanoutOptions;
use crate::deploy::retry::RetryPolicy;
use crate::errors::OrchError;
use crate::filesys::file::File;
use crate::logs::LogOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Longest accepted remote command deadline: one week
pub const MAX_COMMAND_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Options for one labctl invocation: settings with command line overrides
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Settings as loaded from disk
    pub settings: Settings,

    /// Print the run summary as JSON
    pub json_output: bool,

    /// Log remote commands instead of running them
    pub dry_run: bool,

    /// Fan-out configuration
    pub fanout: FanoutOptions,
}

impl AppOptions {
    /// Read the settings file and apply command line overrides.
    ///
    /// A missing settings file in the state directory means defaults; a
    /// missing file named with `--config` is an error.
    pub async fn load(flags: &GlobalFlags) -> Result<Self, OrchError> {
        let layout = match &flags.state_dir {
            Some(dir) => StorageLayout::new(dir.clone()),
            None => StorageLayout::default(),
        };

        let settings = match &flags.config {
            Some(path) => {
                let file = File::new(path.clone());
                if !file.exists().await {
                    return Err(OrchError::ConfigError(format!(
                        "Settings file {} not found",
                        path.display()
                    )));
                }
                file.read_json::<Settings>().await?
            }
            None => {
                let file = layout.settings_file();
                if file.exists().await {
                    file.read_json::<Settings>().await?
                } else {
                    Settings::default()
                }
            }
        };

        Self::resolve(layout, settings, flags)
    }

    /// Apply command line overrides to the settings
    pub fn resolve(
        layout: StorageLayout,
        mut settings: Settings,
        flags: &GlobalFlags,
    ) -> Result<Self, OrchError> {
        if let Some(level) = &flags.log_level {
            settings.log_level = level.clone();
        }
        if let Some(parallelism) = flags.parallelism {
            settings.parallelism = parallelism;
        }
        if let Some(timeout) = flags.timeout_secs {
            settings.command_timeout_secs = timeout;
        }

        if settings.parallelism == 0 {
            return Err(OrchError::ConfigError(
                "parallelism must be at least 1".to_string(),
            ));
        }
        if settings.command_timeout_secs == 0 {
            return Err(OrchError::ConfigError(
                "command timeout must be at least 1 second".to_string(),
            ));
        }
        if settings.command_timeout_secs > MAX_COMMAND_TIMEOUT_SECS {
            return Err(OrchError::ConfigError(format!(
                "command timeout must be at most {} seconds",
                MAX_COMMAND_TIMEOUT_SECS
            )));
        }
        if !settings.cluster.ca_cert_hash_valid() {
            return Err(OrchError::ConfigError(
                "cluster.discovery_ca_cert_hash must be sha256:<64 hex digits>".to_string(),
            ));
        }

        let fanout = FanoutOptions {
            parallelism: settings.parallelism,
            command_timeout: Duration::from_secs(settings.command_timeout_secs),
            retry: RetryPolicy::from(&settings.retry),
        };

        Ok(Self {
            layout,
            json_output: flags.json,
            dry_run: flags.dry_run,
            fanout,
            settings,
        })
    }

    /// Whether run state is written back to the state directory
    pub fn persist_state(&self) -> bool {
        self.settings.persist_state && !self.dry_run
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.settings.log_level.clone(),
            stderr: true,
            log_dir: self
                .settings
                .log_to_file
                .then(|| self.layout.logs_dir().path().to_path_buf()),
            json_format: self.settings.json_logs,
        }
    }
}
