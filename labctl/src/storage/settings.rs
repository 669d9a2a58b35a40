//! Settings file management

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// labctl settings, read from `settings.json` in the state directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Also write logs to `<state dir>/logs`
    #[serde(default)]
    pub log_to_file: bool,

    /// Emit logs as JSON
    #[serde(default)]
    pub json_logs: bool,

    /// SSH transport configuration
    #[serde(default)]
    pub ssh: SshSettings,

    /// Deadline for a single remote command, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Maximum number of hosts worked on at once
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Retry policy for hosts that could not be reached
    #[serde(default)]
    pub retry: RetrySettings,

    /// Load balancer configuration
    #[serde(default)]
    pub balancer: BalancerSettings,

    /// Cluster flavor used when `--flavor` is not given
    #[serde(default = "default_flavor")]
    pub default_flavor: String,

    /// How workers join a cluster
    #[serde(default)]
    pub cluster: ClusterSettings,

    /// Persist topology and credentials between runs
    #[serde(default = "default_true")]
    pub persist_state: bool,
}

fn default_true() -> bool {
    true
}

fn default_command_timeout() -> u64 {
    600
}

fn default_parallelism() -> usize {
    4
}

fn default_flavor() -> String {
    "k3s".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            json_logs: false,
            ssh: SshSettings::default(),
            command_timeout_secs: default_command_timeout(),
            parallelism: default_parallelism(),
            retry: RetrySettings::default(),
            balancer: BalancerSettings::default(),
            default_flavor: default_flavor(),
            cluster: ClusterSettings::default(),
            persist_state: true,
        }
    }
}

/// SSH transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// Client binary, looked up on `PATH` unless absolute
    #[serde(default = "default_ssh_program")]
    pub program: String,

    /// Remote user; the ssh client default applies when absent
    #[serde(default)]
    pub user: Option<String>,

    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Private key passed with `-i`
    #[serde(default)]
    pub identity_file: Option<String>,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Extra `-o` options, e.g. `StrictHostKeyChecking=accept-new`
    #[serde(default = "default_ssh_options")]
    pub options: Vec<String>,
}

fn default_ssh_program() -> String {
    "ssh".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_ssh_options() -> Vec<String> {
    vec!["StrictHostKeyChecking=accept-new".to_string()]
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            program: default_ssh_program(),
            user: None,
            port: default_ssh_port(),
            identity_file: None,
            connect_timeout_secs: default_connect_timeout(),
            options: default_ssh_options(),
        }
    }
}

/// Retry settings for unreachable hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per host, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for the backoff delay, in seconds
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_max_delay_secs() -> u64 {
    30
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

/// Cluster join settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Pin the kubeadm control plane CA when joining, as `sha256:<hex>`.
    /// Without it workers join with CA verification skipped.
    #[serde(default)]
    pub discovery_ca_cert_hash: Option<String>,
}

impl ClusterSettings {
    /// Whether the CA hash, when set, has the form kubeadm expects
    pub fn ca_cert_hash_valid(&self) -> bool {
        match self.discovery_ca_cert_hash.as_deref() {
            None => true,
            Some(hash) => hash.strip_prefix("sha256:").is_some_and(|hex| {
                hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit())
            }),
        }
    }
}

/// Reverse proxy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerSettings {
    /// Port the balancer listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Port the workers serve on
    #[serde(default = "default_backend_port")]
    pub backend_port: u16,

    /// Where the config is written on the balancer host
    #[serde(default = "default_config_path")]
    pub config_path: String,

    /// Command run after the config is written
    #[serde(default = "default_reload_command")]
    pub reload_command: Vec<String>,
}

fn default_listen_port() -> u16 {
    80
}

fn default_backend_port() -> u16 {
    80
}

fn default_config_path() -> String {
    "/etc/nginx/conf.d/labctl.conf".to_string()
}

fn default_reload_command() -> Vec<String> {
    vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()]
}

impl Default for BalancerSettings {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            backend_port: default_backend_port(),
            config_path: default_config_path(),
            reload_command: default_reload_command(),
        }
    }
}
