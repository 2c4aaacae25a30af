//! Dev.to (Forem) platform implementation

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::http::{build_client, send_json};
use super::{ensure_env, Published, Publisher, PublisherSettings};
use crate::credentials::{require_secret, EnvSource, DEVTO_API_KEY};
use crate::error::PlatformError;
use crate::types::{Platform, PlatformContent, PublishMode};

pub const DEFAULT_BASE_URL: &str = "https://dev.to/api";
const NAME: &str = "Dev.to";

#[derive(Debug, Serialize)]
struct CreateArticle<'a> {
    article: Article<'a>,
}

#[derive(Debug, Serialize)]
struct Article<'a> {
    title: &'a str,
    body_markdown: &'a str,
    published: bool,
    tags: &'a [String],
    canonical_url: &'a str,
    #[serde(rename = "main_image", skip_serializing_if = "Option::is_none")]
    cover_image_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ArticleResponse {
    id: u64,
    url: String,
    #[serde(default)]
    published: bool,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    username: String,
}

pub struct DevToPublisher {
    client: Client,
    base_url: String,
    api_key: Result<SecretString, PlatformError>,
}

impl DevToPublisher {
    pub fn new(api_key: SecretString, settings: &PublisherSettings) -> Result<Self, PlatformError> {
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            api_key: Ok(api_key),
        })
    }

    /// Missing credentials are reported by `check_credentials`, not here
    pub fn from_env(env: &dyn EnvSource, settings: &PublisherSettings) -> Result<Self, PlatformError> {
        let api_key = ensure_env(env, Platform::DevTo, None)
            .and_then(|_| require_secret(env, DEVTO_API_KEY));
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            api_key,
        })
    }

    fn api_key(&self) -> Result<&str, PlatformError> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .map_err(Clone::clone)
    }
}

#[async_trait]
impl Publisher for DevToPublisher {
    fn platform(&self) -> Platform {
        Platform::DevTo
    }

    fn check_credentials(&self) -> Result<(), PlatformError> {
        self.api_key().map(|_| ())
    }

    async fn verify_remote(&self) -> Result<(), PlatformError> {
        let request = self
            .client
            .get(format!("{}/users/me", self.base_url))
            .header("api-key", self.api_key()?);
        let user: UserResponse = send_json(NAME, request).await?;
        tracing::debug!(platform = "devto", username = %user.username, "[devto] Credentials verified");
        Ok(())
    }

    fn supports_staging(&self) -> bool {
        true
    }

    async fn publish_content(
        &self,
        content: &PlatformContent,
        mode: PublishMode,
    ) -> Result<Published, PlatformError> {
        let body = CreateArticle {
            article: Article {
                title: &content.title,
                body_markdown: &content.content,
                published: mode != PublishMode::Staged,
                tags: &content.tags,
                canonical_url: &content.canonical_url,
                cover_image_url: content.cover_image.as_deref(),
                description: content.excerpt.as_deref(),
            },
        };

        let request = self
            .client
            .post(format!("{}/articles", self.base_url))
            .header("api-key", self.api_key()?)
            .json(&body);
        let article: ArticleResponse = send_json(NAME, request).await?;

        Ok(Published::new(article.id.to_string(), Some(article.url))
            .with_metadata("articleId", article.id)
            .with_metadata("draft", !article.published))
    }
}
