//! Small helpers shared across labctl

use std::fmt::Write as _;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What `labctl version` prints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

pub fn version_info() -> VersionInfo {
    VersionInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        // Set by build.rs
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Exponential backoff between attempts on an unreachable host
#[derive(Debug, Clone)]
pub struct CooldownOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for CooldownOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Delay before retry number `attempt + 1`, capped at `max_delay`
pub fn calc_exp_backoff(options: &CooldownOptions, attempt: u32) -> Duration {
    let factor = options.multiplier.powi(attempt.min(32) as i32);
    scale_capped(options.base_delay, factor, options.max_delay)
}

/// Backoff delay with up to 25% random jitter so parallel retries spread out
pub fn calc_jittered_backoff(options: &CooldownOptions, attempt: u32) -> Duration {
    let delay = calc_exp_backoff(options, attempt);
    let jitter = rand::thread_rng().gen_range(0.0..=0.25);
    scale_capped(delay, 1.0 + jitter, options.max_delay)
}

/// `delay * factor`, at most `cap`. Computed in seconds so no product overflows.
fn scale_capped(delay: Duration, factor: f64, cap: Duration) -> Duration {
    let secs = delay.as_secs_f64() * factor;
    if secs.is_finite() && secs >= 0.0 && secs < cap.as_secs_f64() {
        Duration::from_secs_f64(secs).min(cap)
    } else {
        cap
    }
}

/// Identifier for one orchestration run
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Lowercase hex SHA-256 digest
pub fn sha256_hash(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .fold(String::with_capacity(64), |mut hex, byte| {
            let _ = write!(hex, "{:02x}", byte);
            hex
        })
}
