//! The composed publish flow for one platform
//!
//! A [`PublishPipeline`] wraps a [`Publisher`] with everything it must not do
//! itself: credential checks, content checks, the rate-limit gate, the retry
//! loop, the per-run deadline and the publish log. `publish` never fails; every
//! outcome becomes a [`PublishResult`].
//!
//! Order of a live publish:
//!
//! 1. credentials present (no network)
//! 2. staged mode supported (no network)
//! 3. content shape valid (no network)
//! 4. one authenticated read (`verify_remote`)
//! 5. rate-limit slot
//! 6. retry-wrapped `publish_content`
//! 7. publish log updated; log failures are only reported
//!
//! Steps 4-6 run under the publish deadline and the run's cancellation token.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::PlatformError;
use crate::platforms::{Published, Publisher};
use crate::publish_log::PublishLogStore;
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::types::{Platform, PlatformContent, PublishMode, PublishResult};

pub const DEFAULT_PUBLISH_DEADLINE: Duration = Duration::from_secs(300);

/// Publisher plus the shared policy objects it runs under
pub struct PublishPipeline {
    publisher: Arc<dyn Publisher>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    log: Arc<PublishLogStore>,
    mode: PublishMode,
    deadline: Duration,
    cancel: CancellationToken,
}

impl PublishPipeline {
    /// Pipeline with the platform's built-in rate limit and default retries
    pub fn new(publisher: Arc<dyn Publisher>, log: Arc<PublishLogStore>) -> Self {
        let platform = publisher.platform();
        let limits = RateLimitConfig::for_platform(platform);
        Self {
            rate_limiter: Arc::new(RateLimiter::for_platform(platform, limits)),
            retry: RetryPolicy::new(RetryConfig::default())
                .with_rate_limit_floor(limits.retry_after_ms.map(Duration::from_millis)),
            publisher,
            log,
            mode: PublishMode::Live,
            deadline: DEFAULT_PUBLISH_DEADLINE,
            cancel: CancellationToken::new(),
        }
    }

    /// Share a limiter between pipelines for the same platform
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        let floor = rate_limiter
            .config()
            .retry_after_ms
            .map(Duration::from_millis);
        self.retry = RetryPolicy::new(*self.retry.config()).with_rate_limit_floor(floor);
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        let floor = self
            .rate_limiter
            .config()
            .retry_after_ms
            .map(Duration::from_millis);
        self.retry = RetryPolicy::new(config).with_rate_limit_floor(floor);
        self
    }

    pub fn with_mode(mut self, mode: PublishMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn platform(&self) -> Platform {
        self.publisher.platform()
    }

    pub fn mode(&self) -> PublishMode {
        self.mode
    }

    /// Credentials present and, outside dry runs, accepted by the platform
    pub async fn validate(&self) -> bool {
        match self.check_configuration().await {
            Ok(()) => true,
            Err(e) => {
                warn!(platform = %self.platform(), "[{}] Invalid configuration: {}", self.platform(), e);
                false
            }
        }
    }

    /// Same as [`validate`](Self::validate), keeping the reason
    pub async fn check_configuration(&self) -> Result<(), PlatformError> {
        self.publisher.check_credentials()?;
        if self.mode != PublishMode::DryRun {
            self.publisher.verify_remote().await?;
        }
        Ok(())
    }

    /// Publish one piece of content; every outcome is a result
    pub async fn publish(&self, content: &PlatformContent) -> PublishResult {
        let platform = self.platform();
        info!(
            platform = %platform,
            slug = %content.slug,
            mode = %self.mode,
            "[{}] Publishing '{}'",
            platform,
            content.slug
        );

        let result = match self.run(content).await {
            Ok(published) => success_result(platform, self.mode, published),
            Err(e) => {
                warn!(platform = %platform, kind = e.kind(), "[{}] Publish failed: {}", platform, e);
                failure_result(platform, &e)
            }
        };

        if self.mode == PublishMode::Live {
            if let Err(e) = self.log.record(&content.slug, &result).await {
                // The platform call already happened; losing the log entry must not undo it
                error!(
                    platform = %platform,
                    slug = %content.slug,
                    "[{}] Failed to write publish log: {}",
                    platform,
                    e
                );
            }
        }

        if result.success {
            info!(
                platform = %platform,
                url = result.url.as_deref().unwrap_or(""),
                partial = result.partial,
                "[{}] Published '{}'",
                platform,
                content.slug
            );
        }
        result
    }

    /// Whether the log holds a successful publish of `slug` on this platform
    pub async fn is_published(&self, slug: &str) -> bool {
        self.log.is_published(slug, self.platform()).await
    }

    pub async fn published_url(&self, slug: &str) -> Option<String> {
        self.log.published_url(slug, self.platform()).await
    }

    async fn run(&self, content: &PlatformContent) -> Result<Published, PlatformError> {
        let platform = self.platform();

        self.publisher.check_credentials()?;
        if self.mode == PublishMode::Staged && !self.publisher.supports_staging() {
            return Err(PlatformError::Configuration(format!(
                "{} has no draft mode; staged publishing is not supported",
                platform.display_name()
            )));
        }
        self.publisher.check_content(content)?;

        if self.mode == PublishMode::DryRun {
            debug!(platform = %platform, "[{}] Dry run, skipping network calls", platform);
            return Ok(Published::new(
                "dry-run",
                Some(format!("dry-run://{}/{}", platform.as_str(), content.slug)),
            )
            .with_metadata("dryRun", true));
        }

        if self.cancel.is_cancelled() {
            return Err(PlatformError::Cancelled(format!(
                "{} publish cancelled before it started",
                platform.display_name()
            )));
        }

        let attempt = async {
            self.publisher.verify_remote().await?;
            self.rate_limiter.acquire().await;
            self.retry
                .run(platform.as_str(), |_| {
                    self.publisher.publish_content(content, self.mode)
                })
                .await
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(PlatformError::Cancelled(format!(
                "{} publish cancelled",
                platform.display_name()
            ))),
            outcome = tokio::time::timeout(self.deadline, attempt) => match outcome {
                Ok(result) => result,
                Err(_) => Err(PlatformError::Timeout(format!(
                    "{} publish exceeded its {}s deadline",
                    platform.display_name(),
                    self.deadline.as_secs()
                ))),
            },
        }
    }
}

fn success_result(platform: Platform, mode: PublishMode, published: Published) -> PublishResult {
    let mut metadata = published.metadata;
    if mode != PublishMode::DryRun {
        metadata.insert("id".to_string(), Value::String(published.id));
    }
    if mode == PublishMode::Staged {
        metadata.insert("staged".to_string(), Value::Bool(true));
    }
    let mut result = PublishResult::success(platform, published.url, metadata);
    result.partial = published.partial;
    result
}

fn failure_result(platform: Platform, error: &PlatformError) -> PublishResult {
    let mut result = PublishResult::failure(platform, error);
    let mut metadata = Map::new();
    match error {
        PlatformError::ThreadInterrupted {
            failed_index,
            total,
            posted_ids,
            ..
        } => {
            metadata.insert("failedIndex".to_string(), Value::from(*failed_index));
            metadata.insert("total".to_string(), Value::from(*total));
            metadata.insert(
                "postedIds".to_string(),
                Value::from(posted_ids.clone()),
            );
        }
        PlatformError::Incomplete { created_id, step, .. } => {
            metadata.insert("createdId".to_string(), Value::from(created_id.clone()));
            metadata.insert("failedStep".to_string(), Value::from(step.clone()));
        }
        _ => {}
    }
    if !metadata.is_empty() {
        result.metadata = metadata;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockPublisher;
    use tempfile::TempDir;

    fn content(platform: Platform) -> PlatformContent {
        PlatformContent::new(platform, "post", "Post", "Body", "https://example.com/post")
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        }
    }

    fn pipeline(publisher: &MockPublisher, dir: &TempDir) -> PublishPipeline {
        PublishPipeline::new(
            Arc::new(publisher.clone()),
            Arc::new(PublishLogStore::new(dir.path())),
        )
        .with_retry(fast_retry())
    }

    #[tokio::test]
    async fn test_success_is_logged() {
        let dir = TempDir::new().unwrap();
        let mock = MockPublisher::success(Platform::DevTo);
        let pipeline = pipeline(&mock, &dir);

        assert!(!pipeline.is_published("post").await);
        let result = pipeline.publish(&content(Platform::DevTo)).await;

        assert!(result.success);
        assert_eq!(result.url.as_deref(), Some("https://mock.example/devto/post"));
        assert!(result.metadata["id"].as_str().unwrap().starts_with("mock-"));
        assert!(pipeline.is_published("post").await);
        assert_eq!(
            pipeline.published_url("post").await.as_deref(),
            Some("https://mock.example/devto/post")
        );
    }

    #[tokio::test]
    async fn test_dry_run_has_no_side_effects() {
        let dir = TempDir::new().unwrap();
        let mock = MockPublisher::auth_failure(Platform::Medium, "revoked");
        let pipeline = pipeline(&mock, &dir).with_mode(PublishMode::DryRun);

        let result = pipeline.publish(&content(Platform::Medium)).await;

        assert!(result.success);
        assert_eq!(result.url.as_deref(), Some("dry-run://medium/post"));
        assert_eq!(result.metadata["dryRun"], true);
        assert_eq!(mock.publish_call_count(), 0);
        assert_eq!(mock.verify_call_count(), 0);
        assert!(!pipeline.is_published("post").await);
    }

    #[tokio::test]
    async fn test_dry_run_still_checks_credentials_and_content() {
        let dir = TempDir::new().unwrap();
        let missing = MockPublisher::not_configured(Platform::DevTo);
        let result = pipeline(&missing, &dir)
            .with_mode(PublishMode::DryRun)
            .publish(&content(Platform::DevTo))
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("configuration"));

        let ok = MockPublisher::success(Platform::DevTo);
        let bad = PlatformContent::new(Platform::DevTo, "post", "t".repeat(200), "Body", "https://e.com");
        let result = pipeline(&ok, &dir)
            .with_mode(PublishMode::DryRun)
            .publish(&bad)
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("validation"));
    }

    #[tokio::test]
    async fn test_staged_refused_without_draft_support() {
        let dir = TempDir::new().unwrap();
        let mock = MockPublisher::success(Platform::Twitter).without_staging();
        let result = pipeline(&mock, &dir)
            .with_mode(PublishMode::Staged)
            .publish(&content(Platform::Twitter))
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("configuration"));
        assert_eq!(mock.verify_call_count(), 0);
        assert_eq!(mock.publish_call_count(), 0);
    }

    #[tokio::test]
    async fn test_staged_success_not_recorded_as_published() {
        let dir = TempDir::new().unwrap();
        let mock = MockPublisher::success(Platform::DevTo);
        let pipeline = pipeline(&mock, &dir).with_mode(PublishMode::Staged);

        let result = pipeline.publish(&content(Platform::DevTo)).await;
        assert!(result.success);
        assert_eq!(result.metadata["staged"], true);
        assert!(!pipeline.is_published("post").await);
    }

    #[tokio::test]
    async fn test_remote_auth_failure_skips_publish() {
        let dir = TempDir::new().unwrap();
        let mock = MockPublisher::auth_failure(Platform::Hashnode, "token expired");
        let pipeline = pipeline(&mock, &dir);

        assert!(!pipeline.validate().await);
        let result = pipeline.publish(&content(Platform::Hashnode)).await;

        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("authentication"));
        assert_eq!(mock.publish_call_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_logged_without_marking_published() {
        let dir = TempDir::new().unwrap();
        let mock = MockPublisher::failing(
            Platform::DevTo,
            PlatformError::Validation("tag rejected".to_string()),
        );
        let pipeline = pipeline(&mock, &dir);
        let result = pipeline.publish(&content(Platform::DevTo)).await;

        assert!(!result.success);
        let store = PublishLogStore::new(dir.path());
        let entry = store.entry("post", Platform::DevTo).await.unwrap().unwrap();
        assert!(!entry.published);
        assert!(entry.error.unwrap().contains("tag rejected"));
    }

    #[tokio::test]
    async fn test_thread_interruption_metadata() {
        let dir = TempDir::new().unwrap();
        let mock = MockPublisher::failing(
            Platform::Twitter,
            PlatformError::ThreadInterrupted {
                failed_index: 3,
                total: 4,
                posted_ids: vec!["1".to_string(), "2".to_string()],
                reason: "503".to_string(),
            },
        );
        let result = pipeline(&mock, &dir).publish(&content(Platform::Twitter)).await;

        assert!(!result.success);
        assert_eq!(mock.publish_call_count(), 1);
        assert_eq!(result.metadata["failedIndex"], 3);
        assert_eq!(result.metadata["postedIds"], serde_json::json!(["1", "2"]));
    }

    #[tokio::test]
    async fn test_deadline_turns_into_timeout() {
        let dir = TempDir::new().unwrap();
        let mock = MockPublisher::with_delay(Platform::DevTo, Duration::from_secs(5));
        let result = pipeline(&mock, &dir)
            .with_deadline(Duration::from_millis(50))
            .publish(&content(Platform::DevTo))
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let mock = MockPublisher::success(Platform::DevTo);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = pipeline(&mock, &dir)
            .with_cancellation(cancel)
            .publish(&content(Platform::DevTo))
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("cancelled"));
        assert_eq!(mock.publish_call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_mid_publish() {
        let dir = TempDir::new().unwrap();
        let mock = MockPublisher::with_delay(Platform::DevTo, Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let pipeline = pipeline(&mock, &dir).with_cancellation(cancel.clone());

        let trigger = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        };
        let content = content(Platform::DevTo);
        let (result, _) = tokio::join!(pipeline.publish(&content), trigger);

        assert_eq!(result.error_kind.as_deref(), Some("cancelled"));
    }
}
