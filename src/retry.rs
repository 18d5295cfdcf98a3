use rand::Rng;
use serde::Deserialize;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Exponential backoff settings, built once at startup and passed to every
/// component that talks to the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Randomize each delay between zero and the computed backoff.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts; for tests and dry runs.
    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: false,
        }
    }

    /// Backoff before retry number `retry` (0-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let backoff = self.backoff(retry);
        if self.jitter && !backoff.is_zero() {
            let millis = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64);
            Duration::from_millis(millis)
        } else {
            backoff
        }
    }
}

/// Run `op` until it succeeds, fails with an error `is_transient` rejects,
/// or `config.max_attempts` attempts have been made. The last error is
/// returned unchanged.
pub async fn with_retry<T, E, F, Fut, C>(
    config: &RetryConfig,
    operation: &str,
    is_transient: C,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: Display,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt < attempts && is_transient(&err) => {
                let delay = config.delay_for(attempt - 1);
                warn!(
                    operation,
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
