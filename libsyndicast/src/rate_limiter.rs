//! Sliding-window rate limiting for platform requests
//!
//! Each platform gets its own [`RateLimiter`]. A limiter admits at most
//! `max_requests` calls in any `window_ms` span. Callers that arrive while the
//! window is full wait until the oldest recorded request ages out.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::types::Platform;

/// Static rate-limit settings for one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_ms: u64,
    /// Backoff floor used after the platform answers with a rate-limit error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl RateLimitConfig {
    /// Built-in limits, kept below each platform's published quota
    pub fn for_platform(platform: Platform) -> Self {
        let (max_requests, window_ms, retry_after_ms) = match platform {
            Platform::DevTo => (10, 30_000, Some(30_000)),
            Platform::Medium => (15, 60_000, Some(60_000)),
            Platform::Hashnode => (20, 60_000, None),
            Platform::Twitter => (50, 15 * 60_000, Some(60_000)),
            Platform::LinkedIn => (100, 24 * 60 * 60_000, None),
            Platform::Typefully => (10, 60_000, Some(10_000)),
            Platform::Newsletter => (5, 60_000, None),
        };
        Self {
            max_requests,
            window_ms,
            retry_after_ms,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Per-platform request gate
///
/// Admission is FIFO: the timestamp queue sits behind a fair async mutex and
/// the lock is held across the wait, so later callers queue behind earlier ones.
pub struct RateLimiter {
    name: String,
    config: RateLimitConfig,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, config: RateLimitConfig) -> Self {
        Self {
            name: name.into(),
            config,
            timestamps: Mutex::new(VecDeque::with_capacity(config.max_requests)),
        }
    }

    pub fn for_platform(platform: Platform, config: RateLimitConfig) -> Self {
        Self::new(platform.as_str(), config)
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait for a free slot, then record this request
    pub async fn acquire(&self) {
        let mut timestamps = self.timestamps.lock().await;

        // A zero limit would never admit anything; treat it as unlimited
        if self.config.max_requests == 0 {
            return;
        }

        let window = self.config.window();
        loop {
            let now = Instant::now();
            while let Some(&oldest) = timestamps.front() {
                if now.duration_since(oldest) >= window {
                    timestamps.pop_front();
                } else {
                    break;
                }
            }

            if timestamps.len() < self.config.max_requests {
                break;
            }

            // Window is full; the oldest entry decides when a slot opens
            let Some(&oldest) = timestamps.front() else {
                break;
            };
            let ready_at = oldest + window;
            debug!(
                platform = %self.name,
                wait_ms = ready_at.saturating_duration_since(now).as_millis() as u64,
                "[{}] Rate limit reached, waiting for a free slot",
                self.name
            );
            sleep_until(ready_at).await;
        }

        timestamps.push_back(Instant::now());
    }

    /// Requests recorded within the current window
    pub async fn in_flight(&self) -> usize {
        let timestamps = self.timestamps.lock().await;
        let now = Instant::now();
        let window = self.config.window();
        timestamps
            .iter()
            .filter(|t| now.duration_since(**t) < window)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(max_requests: usize, window_ms: u64) -> RateLimiter {
        RateLimiter::new(
            "test",
            RateLimitConfig {
                max_requests,
                window_ms,
                retry_after_ms: None,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_allows_requests_under_limit_without_waiting() {
        let limiter = limiter(5, 1_000);
        let start = Instant::now();

        for _ in 0..5 {
            limiter.acquire().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_flight().await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_oldest_to_expire() {
        let limiter = limiter(2, 1_000);
        let start = Instant::now();

        limiter.acquire().await;
        tokio::time::advance(Duration::from_millis(300)).await;
        limiter.acquire().await;

        // Third request must wait until the first ages out at t=1000ms
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_window_exceeds_max_requests() {
        let max_requests = 3;
        let window = Duration::from_millis(500);
        let limiter = limiter(max_requests, 500);
        let mut admitted = Vec::new();

        for i in 0..20u64 {
            limiter.acquire().await;
            admitted.push(Instant::now());
            // Irregular arrivals
            tokio::time::advance(Duration::from_millis((i * 37) % 120)).await;
        }

        for (i, start) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < window)
                .count();
            assert!(
                in_window <= max_requests,
                "window starting at #{} admitted {} requests",
                i,
                in_window
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_admitted_in_arrival_order() {
        let limiter = Arc::new(limiter(1, 100));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for id in 0..4 {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                order.lock().unwrap().push(id);
            }));
            // Make arrival order deterministic
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_is_unlimited() {
        let limiter = limiter(0, 1_000);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_platform_defaults() {
        let devto = RateLimitConfig::for_platform(Platform::DevTo);
        assert_eq!(devto.max_requests, 10);
        assert_eq!(devto.window(), Duration::from_secs(30));

        let linkedin = RateLimitConfig::for_platform(Platform::LinkedIn);
        assert_eq!(linkedin.window(), Duration::from_secs(86_400));
    }
}
