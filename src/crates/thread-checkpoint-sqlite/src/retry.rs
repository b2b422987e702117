//! Retry logic with exponential backoff
//!
//! Connection establishment and read operations go through [`with_retry`].
//! Only errors reporting a temporarily unavailable backend are retried.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thread_checkpoint::Result;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: usize,

    /// Initial delay before first retry (in milliseconds)
    pub initial_delay_ms: u64,

    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (e.g., 2.0 for doubling)
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 2_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(max_retries: usize, initial_delay_ms: u64, max_delay_ms: u64, multiplier: f64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            max_delay_ms,
            multiplier,
        }
    }

    /// No retries at all
    pub fn disabled() -> Self {
        Self::new(0, 0, 0, 1.0)
    }

    /// Calculate delay for a given attempt number (0-indexed)
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let delay_ms = (self.initial_delay_ms as f64) * self.multiplier.powi(attempt as i32);
        let capped_delay = delay_ms.min(self.max_delay_ms as f64);
        Duration::from_millis(capped_delay as u64)
    }
}

/// Execute a store operation with retry logic
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation_name` - Identifier for logging
/// * `operation` - Async function to execute
///
/// Errors that are not [`is_retryable`](thread_checkpoint::CheckpointError::is_retryable) are returned at once.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = %operation_name,
                        attempt = attempt,
                        "Retry succeeded"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = config.calculate_delay(attempt);
                attempt += 1;
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, will retry"
                );
                sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(
                        operation = %operation_name,
                        attempt = attempt + 1,
                        error = %e,
                        "Operation failed, max retries exhausted"
                    );
                }
                return Err(e);
            }
        }
    }
}
