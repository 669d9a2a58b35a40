//! Caller-side retry for remote commands
//!
//! Only connection failures are retried: the command never started, so
//! running it again cannot apply it twice. Timeouts and non-zero exits are
//! final because the remote side may be half way through.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::ExecError;
use crate::storage::settings::RetrySettings;
use crate::utils::{calc_jittered_backoff, CooldownOptions};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub cooldown: CooldownOptions,
}

impl RetryPolicy {
    /// Exactly one attempt
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            cooldown: CooldownOptions::default(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            cooldown: CooldownOptions {
                base_delay: Duration::from_millis(settings.base_delay_ms),
                max_delay: Duration::from_secs(settings.max_delay_secs),
                multiplier: 2.0,
            },
        }
    }
}

/// Run `operation` until it succeeds, fails for a reason other than an
/// unreachable host, runs out of attempts, or the run is cancelled.
///
/// Returns the last result and the number of attempts made.
pub async fn retry_unreachable<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    cancel: &CancellationToken,
    mut operation: F,
) -> (Result<T, ExecError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExecError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = operation().await;

        match &result {
            Err(e) if e.is_connect_failure() && attempt < policy.max_attempts => {
                let delay = calc_jittered_backoff(&policy.cooldown, attempt - 1);
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}",
                    label, attempt, policy.max_attempts, e, delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => return (result, attempt),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            _ => return (result, attempt),
        }
    }
}
