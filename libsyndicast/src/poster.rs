//! Multi-platform publishing orchestration
//!
//! This module fans one canonical post out to every configured platform
//! concurrently and aggregates the outcomes into a [`PublishReport`]. Platforms
//! are isolated from each other: one failing never stops or delays the rest,
//! and the report is built only after every platform has settled.

use chrono::Utc;
use futures::future::join_all;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::content::adapt;
use crate::credentials::EnvSource;
use crate::error::{Result, SyndicastError};
use crate::pipeline::PublishPipeline;
use crate::platforms::devto::DevToPublisher;
use crate::platforms::hashnode::HashnodePublisher;
use crate::platforms::linkedin::LinkedInPublisher;
use crate::platforms::medium::MediumPublisher;
use crate::platforms::newsletter::NewsletterPublisher;
use crate::platforms::twitter::TwitterPublisher;
use crate::platforms::typefully::TypefullyPublisher;
use crate::platforms::{Publisher, PublisherSettings};
use crate::publish_log::PublishLogStore;
use crate::rate_limiter::RateLimiter;
use crate::types::{Platform, PostMetadata, PublishMode, PublishResult, PublishReport};

/// Orchestrator over one pipeline per platform
pub struct MultiPlatformPublisher {
    pipelines: Vec<PublishPipeline>,
    log: Arc<PublishLogStore>,
}

impl MultiPlatformPublisher {
    /// Create a new MultiPlatformPublisher
    ///
    /// # Arguments
    ///
    /// * `pipelines` - One pipeline per target platform
    /// * `log` - The publish log the pipelines write to, consulted for idempotent skips
    pub fn new(pipelines: Vec<PublishPipeline>, log: Arc<PublishLogStore>) -> Self {
        Self { pipelines, log }
    }

    /// Build publishers and pipelines for `platforms` from configuration
    ///
    /// Credentials come from `env`. A platform with missing credentials still
    /// gets a pipeline; its publish fails with a configuration error, so the
    /// report names the missing variables.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use libsyndicast::config::Config;
    /// use libsyndicast::credentials::ProcessEnv;
    /// use libsyndicast::poster::MultiPlatformPublisher;
    /// use libsyndicast::types::PublishMode;
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # fn example() -> libsyndicast::error::Result<()> {
    /// let config = Config::load()?;
    /// let platforms = config.default_platforms()?;
    /// let publisher = MultiPlatformPublisher::from_config(
    ///     &config,
    ///     &ProcessEnv,
    ///     &platforms,
    ///     PublishMode::DryRun,
    ///     CancellationToken::new(),
    /// )?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_config(
        config: &Config,
        env: &dyn EnvSource,
        platforms: &[Platform],
        mode: PublishMode,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let log = Arc::new(PublishLogStore::new(config.log_dir()));
        let pipelines = create_publishers(config, env, platforms)?
            .into_iter()
            .map(|publisher| {
                let platform = publisher.platform();
                let limiter = RateLimiter::for_platform(platform, config.rate_limit_for(platform));
                PublishPipeline::new(publisher, log.clone())
                    .with_rate_limiter(Arc::new(limiter))
                    .with_retry(config.retry_for(platform))
                    .with_mode(mode)
                    .with_deadline(config.publish_deadline())
                    .with_cancellation(cancel.clone())
            })
            .collect();
        Ok(Self::new(pipelines, log))
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.pipelines.iter().map(PublishPipeline::platform).collect()
    }

    pub fn log(&self) -> &PublishLogStore {
        &self.log
    }

    /// Publish a post to every platform
    ///
    /// Each platform gets content adapted from `meta` and `body`. Platforms the
    /// log already marks as published are skipped, reporting the stored URL,
    /// unless `force` is set. Results are in pipeline order.
    pub async fn publish_all(&self, meta: &PostMetadata, body: &str, force: bool) -> PublishReport {
        let started_at = Utc::now();
        info!(
            slug = %meta.slug,
            platforms = self.pipelines.len(),
            "Publishing '{}' to {} platform(s)",
            meta.slug,
            self.pipelines.len()
        );

        let futures = self
            .pipelines
            .iter()
            .map(|pipeline| self.publish_one(pipeline, meta, body, force));
        let results = join_all(futures).await;

        let report = PublishReport::from_results(&meta.slug, started_at, results);
        info!(slug = %meta.slug, "{}", report.summary);
        report
    }

    async fn publish_one(
        &self,
        pipeline: &PublishPipeline,
        meta: &PostMetadata,
        body: &str,
        force: bool,
    ) -> PublishResult {
        let platform = pipeline.platform();
        if !force {
            if let Some(url) = self.already_published(&meta.slug, platform).await {
                info!(
                    platform = %platform,
                    slug = %meta.slug,
                    "[{}] Already published at {}, skipping",
                    platform,
                    url
                );
                let mut metadata = Map::new();
                metadata.insert("skipped".to_string(), Value::Bool(true));
                return PublishResult::success(platform, Some(url), metadata);
            }
        }

        let content = adapt(meta, body, platform);
        pipeline.publish(&content).await
    }

    async fn already_published(&self, slug: &str, platform: Platform) -> Option<String> {
        if !self.log.is_published(slug, platform).await {
            return None;
        }
        // Published without a URL still counts; report an empty link
        Some(
            self.log
                .published_url(slug, platform)
                .await
                .unwrap_or_default(),
        )
    }
}

/// Create publisher instances for the requested platforms
///
/// Disabled platforms are refused rather than silently dropped, so a
/// `--platform` flag never does nothing.
///
/// # Errors
///
/// Returns an error if a platform is disabled in the config or an HTTP client
/// cannot be built. Missing credentials are not an error here.
pub fn create_publishers(
    config: &Config,
    env: &dyn EnvSource,
    platforms: &[Platform],
) -> Result<Vec<Arc<dyn Publisher>>> {
    let mut publishers: Vec<Arc<dyn Publisher>> = Vec::new();

    for &platform in platforms {
        if !config.platform(platform).enabled {
            return Err(SyndicastError::InvalidInput(format!(
                "Platform '{}' is disabled in the configuration",
                platform
            )));
        }

        let settings = PublisherSettings {
            base_url: config.base_url_for(platform).map(str::to_string),
            request_timeout: config.request_timeout(),
        };

        info!(platform = %platform, "Creating {} publisher", platform.display_name());
        let publisher: Arc<dyn Publisher> = match platform {
            Platform::DevTo => Arc::new(DevToPublisher::from_env(env, &settings)?),
            Platform::Medium => Arc::new(MediumPublisher::from_env(env, &settings)?),
            Platform::Hashnode => Arc::new(HashnodePublisher::from_env(env, &settings)?),
            Platform::Twitter => Arc::new(TwitterPublisher::from_env(env, &settings)?),
            Platform::LinkedIn => Arc::new(LinkedInPublisher::from_env(env, &settings)?),
            Platform::Typefully => Arc::new(TypefullyPublisher::from_env(
                env,
                config.typefully.targets.clone(),
                config.typefully.publish_at,
                &settings,
            )?),
            Platform::Newsletter => Arc::new(NewsletterPublisher::from_env(
                env,
                config.newsletter.provider,
                &settings,
            )?),
        };
        publishers.push(publisher);
    }

    Ok(publishers)
}
