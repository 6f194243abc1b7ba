//! Exponential backoff with jitter for backend calls that fail transiently.
//!
//! Stack recreation is the main user: CloudFormation rejects a `CreateStack`
//! for a name whose previous incarnation is still being torn down, and the
//! rejection clears on its own after a short while.

use std::time::Duration;

use rand::Rng;
use stackfleet_config::RebuildConfig;
use tracing::{error, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::from(&RebuildConfig::default())
    }
}

impl From<&RebuildConfig> for RetryConfig {
    fn from(config: &RebuildConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier)
                .min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Runs `operation` until it succeeds or the attempts run out, returning the
/// last error in the latter case.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt,
                        error = %e,
                        "operation failed after max retries"
                    );
                    return Err(e);
                }

                // 0.5x to 1.5x of the nominal delay
                let jitter = rand::rng().random_range(0.5..1.5);
                let jittered =
                    Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    delay_ms = jittered.as_millis() as u64,
                    "operation failed, retrying"
                );

                tokio::time::sleep(jittered).await;
                delay = config.next_delay(delay);
            }
        }
    }
}
