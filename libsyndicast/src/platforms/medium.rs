//! Medium platform implementation
//!
//! Publishing is two calls: create the story, then fetch its status. The
//! story exists as soon as the first call succeeds, so a failed status fetch
//! is reported as an unconfirmed success rather than an error; retrying would
//! create a duplicate story.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::http::{build_client, send_json};
use super::{ensure_env, Published, Publisher, PublisherSettings};
use crate::credentials::{require_secret, EnvSource, MEDIUM_INTEGRATION_TOKEN};
use crate::error::PlatformError;
use crate::types::{Platform, PlatformContent, PublishMode};

pub const DEFAULT_BASE_URL: &str = "https://api.medium.com/v1";
const NAME: &str = "Medium";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct MediumUser {
    id: String,
    #[serde(default)]
    username: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePost<'a> {
    title: &'a str,
    content_format: &'static str,
    content: &'a str,
    tags: &'a [String],
    canonical_url: &'a str,
    publish_status: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediumPost {
    id: String,
    url: String,
    #[serde(default)]
    publish_status: Option<String>,
}

pub struct MediumPublisher {
    client: Client,
    base_url: String,
    token: Result<SecretString, PlatformError>,
}

impl MediumPublisher {
    pub fn new(token: SecretString, settings: &PublisherSettings) -> Result<Self, PlatformError> {
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            token: Ok(token),
        })
    }

    pub fn from_env(env: &dyn EnvSource, settings: &PublisherSettings) -> Result<Self, PlatformError> {
        let token = ensure_env(env, Platform::Medium, None)
            .and_then(|_| require_secret(env, MEDIUM_INTEGRATION_TOKEN));
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            token,
        })
    }

    fn token(&self) -> Result<&str, PlatformError> {
        self.token
            .as_ref()
            .map(|t| t.expose_secret())
            .map_err(Clone::clone)
    }

    async fn current_user(&self) -> Result<MediumUser, PlatformError> {
        let request = self
            .client
            .get(format!("{}/me", self.base_url))
            .bearer_auth(self.token()?);
        let envelope: Envelope<MediumUser> = send_json(NAME, request).await?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl Publisher for MediumPublisher {
    fn platform(&self) -> Platform {
        Platform::Medium
    }

    fn check_credentials(&self) -> Result<(), PlatformError> {
        self.token().map(|_| ())
    }

    async fn verify_remote(&self) -> Result<(), PlatformError> {
        let user = self.current_user().await?;
        tracing::debug!(platform = "medium", username = %user.username, "[medium] Credentials verified");
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
        let user = self.current_user().await?;

        let body = CreatePost {
            title: &content.title,
            content_format: "markdown",
            content: &content.content,
            tags: &content.tags,
            canonical_url: &content.canonical_url,
            publish_status: if mode == PublishMode::Staged {
                "draft"
            } else {
                "public"
            },
        };
        let request = self
            .client
            .post(format!("{}/users/{}/posts", self.base_url, user.id))
            .bearer_auth(self.token()?)
            .json(&body);
        let created: Envelope<MediumPost> = send_json(NAME, request).await?;
        let created = created.data;

        let status_request = self
            .client
            .get(format!("{}/posts/{}", self.base_url, created.id))
            .bearer_auth(self.token()?);
        let published = match send_json::<Envelope<MediumPost>>(NAME, status_request).await {
            Ok(status) => Published::new(&created.id, Some(status.data.url)).with_metadata(
                "publishStatus",
                status
                    .data
                    .publish_status
                    .unwrap_or_else(|| body.publish_status.to_string()),
            ),
            Err(e) => {
                warn!(
                    platform = "medium",
                    post_id = %created.id,
                    "[medium] Story created but status check failed; it may be left as a draft: {}",
                    e
                );
                Published::new(&created.id, Some(created.url))
                    .with_metadata(
                        "publishStatus",
                        created
                            .publish_status
                            .unwrap_or_else(|| body.publish_status.to_string()),
                    )
                    .with_metadata("statusUnconfirmed", true)
            }
        };

        Ok(published.with_metadata("authorId", user.id))
    }
}
