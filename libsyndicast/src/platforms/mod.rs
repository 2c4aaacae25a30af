//! Publisher abstraction and platform clients
//!
//! Every platform implements [`Publisher`]. A publisher only knows how to
//! talk to its platform: checking credentials, building requests and reading
//! responses. Rate limiting, retries, dry runs and the publish log are layered
//! on top by [`crate::pipeline::PublishPipeline`], so no publisher repeats them.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::content::validate_content;
use crate::credentials::{validate_platform_env, EnvSource};
use crate::error::PlatformError;
use crate::types::{Platform, PlatformContent, PublishMode};

pub mod devto;
pub mod hashnode;
pub mod http;
pub mod linkedin;
pub mod medium;
pub mod newsletter;
pub mod twitter;
pub mod typefully;

// Available outside tests so integration tests and dry runs can use it
pub mod mock;

/// What a platform reported after accepting content
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Published {
    /// Platform-specific identifier of the created item
    pub id: String,
    pub url: Option<String>,
    pub metadata: Map<String, Value>,
    /// Some downstream targets did not confirm (Typefully fan-out)
    pub partial: bool,
}

impl Published {
    pub fn new(id: impl Into<String>, url: Option<String>) -> Self {
        Self {
            id: id.into(),
            url,
            metadata: Map::new(),
            partial: false,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A distribution target
///
/// Implementations must be cheap to share across tasks; all mutable state
/// lives in the pipeline that drives them.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> Platform;

    /// Check that required credentials are present, without any network call
    fn check_credentials(&self) -> Result<(), PlatformError>;

    /// One authenticated read (e.g. "get current user") to catch revoked or
    /// expired credentials before publishing
    async fn verify_remote(&self) -> Result<(), PlatformError>;

    /// Whether staged mode maps onto a draft on this platform
    fn supports_staging(&self) -> bool {
        false
    }

    /// Content-shape check run before any network call
    ///
    /// The default applies the platform limits table; publishers with extra
    /// rules (thread length, for one) extend it.
    fn check_content(&self, content: &PlatformContent) -> Result<(), PlatformError> {
        ensure_valid(content)
    }

    /// Perform the platform-specific publish
    ///
    /// Called by the pipeline inside the retry loop, so it must be safe to
    /// call again after a retryable error.
    async fn publish_content(
        &self,
        content: &PlatformContent,
        mode: PublishMode,
    ) -> Result<Published, PlatformError>;
}

/// Settings every HTTP publisher is built from
#[derive(Debug, Clone)]
pub struct PublisherSettings {
    /// Overrides the platform's public API root
    pub base_url: Option<String>,
    pub request_timeout: Duration,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl PublisherSettings {
    pub(crate) fn base_url_or(&self, default: &str) -> String {
        http::normalize_base_url(self.base_url.as_deref().unwrap_or(default))
    }
}

/// Re-run validation and turn any problem into a `Validation` error
pub fn ensure_valid(content: &PlatformContent) -> Result<(), PlatformError> {
    let checked = validate_content(content.clone());
    if checked.is_valid() {
        Ok(())
    } else {
        Err(PlatformError::Validation(format!(
            "{}: {}",
            content.platform.display_name(),
            checked.validation_errors().join("; ")
        )))
    }
}

/// Fail with every missing variable named, or pass
pub(crate) fn ensure_env(
    env: &dyn EnvSource,
    platform: Platform,
    provider: Option<newsletter::NewsletterProvider>,
) -> Result<(), PlatformError> {
    let check = validate_platform_env(env, platform, provider);
    if check.valid {
        Ok(())
    } else {
        Err(PlatformError::Configuration(format!(
            "{} is missing environment variable(s): {}",
            platform.display_name(),
            check.missing.join(", ")
        )))
    }
}

/// Refusal used by platforms without a draft concept
pub(crate) fn staging_unsupported(platform: Platform) -> PlatformError {
    PlatformError::Configuration(format!(
        "{} has no draft mode; staged publishing is not supported",
        platform.display_name()
    ))
}
