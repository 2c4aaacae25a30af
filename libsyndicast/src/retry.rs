//! Bounded exponential backoff around platform calls

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::PlatformError;

/// Static retry settings for one platform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Sleep after a failed `attempt` (1-based):
    /// `min(initial * multiplier^(attempt-1), max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Runs an operation until it succeeds, fails permanently, or runs out of attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    /// Lower bound for the sleep after a rate-limit response
    rate_limit_floor: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            rate_limit_floor: None,
        }
    }

    pub fn with_rate_limit_floor(mut self, floor: Option<Duration>) -> Self {
        self.rate_limit_floor = floor;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Call `operation` with the 1-based attempt number until it settles
    ///
    /// Non-retryable errors (authentication, validation, configuration,
    /// interrupted threads) are returned after the attempt that produced them.
    pub async fn run<T, F, Fut>(&self, platform: &str, mut operation: F) -> Result<T, PlatformError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        let max_attempts = self.config.max_retries.max(1);

        let mut attempt = 1;
        loop {
            debug!(platform, attempt, max_attempts, "[{}] Attempt {}/{}", platform, attempt, max_attempts);

            let error = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(platform, attempt, "[{}] Succeeded on attempt {}", platform, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                warn!(
                    platform,
                    attempt,
                    kind = error.kind(),
                    "[{}] Permanent failure, not retrying: {}",
                    platform,
                    error
                );
                return Err(error);
            }

            if attempt >= max_attempts {
                warn!(
                    platform,
                    attempts = max_attempts,
                    "[{}] Failed after {} attempts: {}",
                    platform,
                    max_attempts,
                    error
                );
                return Err(error);
            }

            let delay = self.next_delay(attempt, &error);
            warn!(
                platform,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "[{}] Transient error (attempt {}/{}): {}. Retrying in {:?}",
                platform,
                attempt,
                max_attempts,
                error,
                delay
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    fn next_delay(&self, attempt: u32, error: &PlatformError) -> Duration {
        let backoff = self.config.delay_for(attempt);
        if !matches!(error, PlatformError::RateLimit { .. }) {
            return backoff;
        }
        // The configured floor holds even when the server asks for less
        let floor = self.rate_limit_floor.unwrap_or_default();
        let hint = error.retry_after().unwrap_or_default();
        backoff.max(floor).max(hint)
    }
}
