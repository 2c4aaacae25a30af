//! Publish pipeline behavior across retries, rate limits and cancellation
//!
//! These tests use mock publishers only, so every count is exact.

use anyhow::Result;
use libsyndicast::error::PlatformError;
use libsyndicast::platforms::mock::MockPublisher;
use libsyndicast::rate_limiter::{RateLimitConfig, RateLimiter};
use libsyndicast::retry::RetryConfig;
use libsyndicast::{
    MultiPlatformPublisher, Platform, PlatformContent, PostMetadata, PublishLogStore, PublishMode,
    PublishPipeline,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        backoff_multiplier: 2.0,
    }
}

fn content(platform: Platform, slug: &str) -> PlatformContent {
    PlatformContent::new(platform, slug, "Post", "Body", "https://example.com/post")
}

fn pipeline(mock: &MockPublisher, dir: &TempDir) -> PublishPipeline {
    PublishPipeline::new(
        Arc::new(mock.clone()),
        Arc::new(PublishLogStore::new(dir.path())),
    )
}

fn meta() -> PostMetadata {
    PostMetadata {
        slug: "post".to_string(),
        title: "Post".to_string(),
        description: "A post.".to_string(),
        tags: vec!["rust".to_string()],
        published_date: "2025-05-01".parse().unwrap(),
        canonical_url: "https://example.com/post".to_string(),
        cover_image: None,
        author: String::new(),
        word_count: 0,
        reading_time: 0,
    }
}

#[tokio::test]
async fn test_transient_failures_bounded_by_max_retries() -> Result<()> {
    let dir = TempDir::new()?;
    let mock = MockPublisher::failing(Platform::DevTo, PlatformError::Network("reset".to_string()));

    let result = pipeline(&mock, &dir)
        .with_retry(fast_retry(4))
        .publish(&content(Platform::DevTo, "post"))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind.as_deref(), Some("network"));
    assert_eq!(mock.publish_call_count(), 4);
    // Remote verification happens once, not per attempt
    assert_eq!(mock.verify_call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_flaky_publisher_recovers() -> Result<()> {
    let dir = TempDir::new()?;
    let mock = MockPublisher::flaky(
        Platform::Hashnode,
        vec![
            PlatformError::Timeout("slow".to_string()),
            PlatformError::Network("reset".to_string()),
        ],
    );
    let pipeline = pipeline(&mock, &dir).with_retry(fast_retry(3));

    let result = pipeline.publish(&content(Platform::Hashnode, "post")).await;

    assert!(result.success);
    assert_eq!(mock.publish_call_count(), 3);
    assert!(pipeline.is_published("post").await);
    Ok(())
}

#[tokio::test]
async fn test_permanent_failures_not_retried() -> Result<()> {
    let dir = TempDir::new()?;
    for error in [
        PlatformError::Authentication("revoked".to_string()),
        PlatformError::Validation("title too long".to_string()),
        PlatformError::Configuration("missing author".to_string()),
    ] {
        let mock = MockPublisher::failing(Platform::Medium, error);
        let result = pipeline(&mock, &dir)
            .with_retry(fast_retry(5))
            .publish(&content(Platform::Medium, "post"))
            .await;

        assert!(!result.success);
        assert_eq!(mock.publish_call_count(), 1);
    }
    Ok(())
}

#[tokio::test]
async fn test_rate_limit_error_retried_after_floor() -> Result<()> {
    let dir = TempDir::new()?;
    let mock = MockPublisher::flaky(
        Platform::Twitter,
        vec![PlatformError::RateLimit {
            message: "slow down".to_string(),
            retry_after: None,
        }],
    );
    let limiter = RateLimiter::for_platform(
        Platform::Twitter,
        RateLimitConfig {
            max_requests: 10,
            window_ms: 1_000,
            retry_after_ms: Some(30),
        },
    );

    let started = std::time::Instant::now();
    let result = pipeline(&mock, &dir)
        .with_rate_limiter(Arc::new(limiter))
        .with_retry(fast_retry(2))
        .publish(&content(Platform::Twitter, "post"))
        .await;

    assert!(result.success);
    assert_eq!(mock.publish_call_count(), 2);
    assert!(started.elapsed() >= Duration::from_millis(30));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rate_limiter_spaces_publishes() -> Result<()> {
    let dir = TempDir::new()?;
    let mock = MockPublisher::success(Platform::LinkedIn);
    let limiter = RateLimiter::for_platform(
        Platform::LinkedIn,
        RateLimitConfig {
            max_requests: 1,
            window_ms: 60_000,
            retry_after_ms: None,
        },
    );
    // Staged mode keeps the publish log untouched
    let pipeline = pipeline(&mock, &dir)
        .with_rate_limiter(Arc::new(limiter))
        .with_mode(PublishMode::Staged);

    let started = tokio::time::Instant::now();
    assert!(pipeline.publish(&content(Platform::LinkedIn, "one")).await.success);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(pipeline.publish(&content(Platform::LinkedIn, "two")).await.success);
    assert!(started.elapsed() >= Duration::from_secs(60));
    assert_eq!(mock.publish_call_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_cancellation_stops_every_platform() -> Result<()> {
    let dir = TempDir::new()?;
    let log = Arc::new(PublishLogStore::new(dir.path()));
    let cancel = CancellationToken::new();

    let slow_devto = MockPublisher::with_delay(Platform::DevTo, Duration::from_secs(10));
    let slow_medium = MockPublisher::with_delay(Platform::Medium, Duration::from_secs(10));
    let pipelines = [&slow_devto, &slow_medium]
        .into_iter()
        .map(|mock| {
            PublishPipeline::new(Arc::new(mock.clone()), log.clone())
                .with_retry(fast_retry(3))
                .with_cancellation(cancel.clone())
        })
        .collect();
    let publisher = MultiPlatformPublisher::new(pipelines, log.clone());

    let trigger = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    };
    let meta = meta();
    let body = "A short body for a short post.";
    let (report, _) = tokio::join!(publisher.publish_all(&meta, body, false), trigger);

    assert_eq!(report.failed_platforms, 2);
    assert!(report
        .results
        .iter()
        .all(|r| r.error_kind.as_deref() == Some("cancelled")));
    assert!(!log.is_published("post", Platform::DevTo).await);
    Ok(())
}

#[tokio::test]
async fn test_one_platform_failing_does_not_block_others() -> Result<()> {
    let dir = TempDir::new()?;
    let log = Arc::new(PublishLogStore::new(dir.path()));

    let ok = MockPublisher::success(Platform::DevTo);
    let broken = MockPublisher::not_configured(Platform::Medium);
    let slow = MockPublisher::with_delay(Platform::Hashnode, Duration::from_millis(30));
    let pipelines = [&ok, &broken, &slow]
        .into_iter()
        .map(|mock| PublishPipeline::new(Arc::new(mock.clone()), log.clone()).with_retry(fast_retry(2)))
        .collect();
    let publisher = MultiPlatformPublisher::new(pipelines, log.clone());

    let report = publisher
        .publish_all(&meta(), "A short body for a short post.", false)
        .await;

    assert_eq!(report.successful_platforms, 2);
    assert_eq!(report.failed_platforms, 1);
    assert_eq!(report.results[1].platform, Platform::Medium);
    assert_eq!(report.results[1].error_kind.as_deref(), Some("configuration"));
    assert_eq!(broken.publish_call_count(), 0);

    let recorded = log.read("post").await?;
    assert_eq!(recorded.len(), 3);
    assert!(recorded["devto"].published);
    assert!(recorded["hashnode"].published);
    assert!(!recorded["medium"].published);
    Ok(())
}
