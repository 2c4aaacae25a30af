//! Mock publisher for testing
//!
//! Simulates successes, scripted failures and latency so the pipeline and the
//! orchestrator can be exercised without credentials or network access.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use super::{Published, Publisher};
use crate::error::PlatformError;
use crate::types::{Platform, PlatformContent, PublishMode};

/// Configuration for mock publisher behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: Platform,

    /// Returned by `check_credentials` when set
    pub credentials_error: Option<PlatformError>,

    /// Returned by `verify_remote` when set
    pub remote_error: Option<PlatformError>,

    /// Errors returned by successive publish calls before succeeding
    pub scripted_failures: Arc<Mutex<VecDeque<PlatformError>>>,

    /// Returned by every publish call once the script runs out
    pub always_fail: Option<PlatformError>,

    /// Simulated network latency per publish call
    pub delay: Duration,

    pub supports_staging: bool,

    /// Report the publish as partially confirmed
    pub partial: bool,

    pub verify_call_count: Arc<Mutex<usize>>,
    pub publish_call_count: Arc<Mutex<usize>>,

    /// Content of every successful publish
    pub published_content: Arc<Mutex<Vec<PlatformContent>>>,
}

impl MockConfig {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            credentials_error: None,
            remote_error: None,
            scripted_failures: Arc::new(Mutex::new(VecDeque::new())),
            always_fail: None,
            delay: Duration::ZERO,
            supports_staging: true,
            partial: false,
            verify_call_count: Arc::new(Mutex::new(0)),
            publish_call_count: Arc::new(Mutex::new(0)),
            published_content: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock publisher; clones share call counters
#[derive(Debug, Clone)]
pub struct MockPublisher {
    config: MockConfig,
}

impl MockPublisher {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// A publisher that always succeeds
    pub fn success(platform: Platform) -> Self {
        Self::new(MockConfig::new(platform))
    }

    /// Credentials present, but the remote rejects them
    pub fn auth_failure(platform: Platform, message: &str) -> Self {
        Self::new(MockConfig {
            remote_error: Some(PlatformError::Authentication(message.to_string())),
            ..MockConfig::new(platform)
        })
    }

    /// Every publish call fails with `error`
    pub fn failing(platform: Platform, error: PlatformError) -> Self {
        Self::new(MockConfig {
            always_fail: Some(error),
            ..MockConfig::new(platform)
        })
    }

    /// The first calls fail with the given errors, then publishing succeeds
    pub fn flaky(platform: Platform, failures: Vec<PlatformError>) -> Self {
        Self::new(MockConfig {
            scripted_failures: Arc::new(Mutex::new(failures.into())),
            ..MockConfig::new(platform)
        })
    }

    /// Required credentials are missing
    pub fn not_configured(platform: Platform) -> Self {
        Self::new(MockConfig {
            credentials_error: Some(PlatformError::Configuration(format!(
                "{} is missing environment variable(s): MOCK_TOKEN",
                platform.display_name()
            ))),
            ..MockConfig::new(platform)
        })
    }

    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(platform)
        })
    }

    pub fn without_staging(mut self) -> Self {
        self.config.supports_staging = false;
        self
    }

    pub fn partial(mut self) -> Self {
        self.config.partial = true;
        self
    }

    pub fn verify_call_count(&self) -> usize {
        *self.config.verify_call_count.lock().unwrap()
    }

    pub fn publish_call_count(&self) -> usize {
        *self.config.publish_call_count.lock().unwrap()
    }

    pub fn published_content(&self) -> Vec<PlatformContent> {
        self.config.published_content.lock().unwrap().clone()
    }

    /// URL a successful publish reports
    pub fn url_for(platform: Platform, slug: &str) -> String {
        format!("https://mock.example/{}/{}", platform.as_str(), slug)
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    fn check_credentials(&self) -> Result<(), PlatformError> {
        match &self.config.credentials_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn verify_remote(&self) -> Result<(), PlatformError> {
        *self.config.verify_call_count.lock().unwrap() += 1;
        match &self.config.remote_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn supports_staging(&self) -> bool {
        self.config.supports_staging
    }

    async fn publish_content(
        &self,
        content: &PlatformContent,
        mode: PublishMode,
    ) -> Result<Published, PlatformError> {
        *self.config.publish_call_count.lock().unwrap() += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        let scripted = self.config.scripted_failures.lock().unwrap().pop_front();
        if let Some(error) = scripted.or_else(|| self.config.always_fail.clone()) {
            return Err(error);
        }

        self.config
            .published_content
            .lock()
            .unwrap()
            .push(content.clone());

        let url = Self::url_for(self.config.platform, &content.slug);
        let mut published = Published::new(format!("mock-{}", uuid::Uuid::new_v4()), Some(url))
            .with_metadata("draft", mode == PublishMode::Staged);
        published.partial = self.config.partial;
        Ok(published)
    }
}
