//! LinkedIn platform implementation
//!
//! Posts are UGC shares of type ARTICLE pointing at the canonical URL.
//! LinkedIn has no drafts, so staged mode is refused.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::http::{build_client, check_status, decode_json, map_reqwest_error, send_json};
use super::{ensure_env, staging_unsupported, Published, Publisher, PublisherSettings};
use crate::credentials::{
    optional_value, require_secret, EnvSource, LINKEDIN_ACCESS_TOKEN, LINKEDIN_AUTHOR_URN,
};
use crate::error::PlatformError;
use crate::types::{Platform, PlatformContent, PublishMode};

pub const DEFAULT_BASE_URL: &str = "https://api.linkedin.com";
const NAME: &str = "LinkedIn";
const RESTLI_ID_HEADER: &str = "x-restli-id";

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
}

struct LinkedInCredentials {
    token: SecretString,
    /// Resolved from `/v2/userinfo` when not configured
    author_urn: Option<String>,
}

pub struct LinkedInPublisher {
    client: Client,
    base_url: String,
    credentials: Result<LinkedInCredentials, PlatformError>,
}

impl LinkedInPublisher {
    pub fn new(
        token: SecretString,
        author_urn: Option<String>,
        settings: &PublisherSettings,
    ) -> Result<Self, PlatformError> {
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            credentials: Ok(LinkedInCredentials { token, author_urn }),
        })
    }

    pub fn from_env(env: &dyn EnvSource, settings: &PublisherSettings) -> Result<Self, PlatformError> {
        let credentials = ensure_env(env, Platform::LinkedIn, None).and_then(|_| {
            Ok(LinkedInCredentials {
                token: require_secret(env, LINKEDIN_ACCESS_TOKEN)?,
                author_urn: optional_value(env, LINKEDIN_AUTHOR_URN),
            })
        });
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            credentials,
        })
    }

    fn credentials(&self) -> Result<&LinkedInCredentials, PlatformError> {
        self.credentials.as_ref().map_err(Clone::clone)
    }

    async fn user_info(&self) -> Result<UserInfo, PlatformError> {
        let request = self
            .client
            .get(format!("{}/v2/userinfo", self.base_url))
            .bearer_auth(self.credentials()?.token.expose_secret());
        send_json(NAME, request).await
    }

    async fn author_urn(&self) -> Result<String, PlatformError> {
        match &self.credentials()?.author_urn {
            Some(urn) => Ok(urn.clone()),
            None => Ok(format!("urn:li:person:{}", self.user_info().await?.sub)),
        }
    }
}

fn share_body(author: &str, content: &PlatformContent) -> Value {
    json!({
        "author": author,
        "lifecycleState": "PUBLISHED",
        "specificContent": {
            "com.linkedin.ugc.ShareContent": {
                "shareCommentary": { "text": content.content },
                "shareMediaCategory": "ARTICLE",
                "media": [{
                    "status": "READY",
                    "originalUrl": content.canonical_url,
                    "title": { "text": content.title },
                    "description": { "text": content.excerpt.clone().unwrap_or_default() }
                }]
            }
        },
        "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" }
    })
}

#[async_trait]
impl Publisher for LinkedInPublisher {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    fn check_credentials(&self) -> Result<(), PlatformError> {
        self.credentials().map(|_| ())
    }

    async fn verify_remote(&self) -> Result<(), PlatformError> {
        let info = self.user_info().await?;
        debug!(platform = "linkedin", member = %info.sub, "[linkedin] Credentials verified");
        Ok(())
    }

    async fn publish_content(
        &self,
        content: &PlatformContent,
        mode: PublishMode,
    ) -> Result<Published, PlatformError> {
        if mode == PublishMode::Staged {
            return Err(staging_unsupported(Platform::LinkedIn));
        }

        let author = self.author_urn().await?;
        let response = self
            .client
            .post(format!("{}/v2/ugcPosts", self.base_url))
            .bearer_auth(self.credentials()?.token.expose_secret())
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&share_body(&author, content))
            .send()
            .await
            .map_err(|e| map_reqwest_error(NAME, e))?;
        let response = check_status(NAME, response).await?;

        let header_id = response
            .headers()
            .get(RESTLI_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let id = match header_id {
            Some(id) => id,
            None => {
                let body: Value = decode_json(NAME, response).await?;
                body.get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        PlatformError::Posting(format!("{} response carried no post id", NAME))
                    })?
            }
        };

        let url = format!("https://www.linkedin.com/feed/update/{}", id);
        Ok(Published::new(&id, Some(url)).with_metadata("author", author))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn content() -> PlatformContent {
        PlatformContent::new(
            Platform::LinkedIn,
            "post",
            "Post",
            "Read this.\n\n#rust",
            "https://example.com/post",
        )
        .with_excerpt("A post")
    }

    fn publisher(server: &MockServer, author: Option<&str>) -> LinkedInPublisher {
        let settings = PublisherSettings {
            base_url: Some(server.base_url()),
            ..Default::default()
        };
        LinkedInPublisher::new(
            SecretString::from("tok".to_string()),
            author.map(str::to_string),
            &settings,
        )
        .unwrap()
    }

    #[test]
    fn test_share_body_shape() {
        let body = share_body("urn:li:person:abc", &content());
        let share = &body["specificContent"]["com.linkedin.ugc.ShareContent"];
        assert_eq!(body["author"], "urn:li:person:abc");
        assert_eq!(share["shareMediaCategory"], "ARTICLE");
        assert_eq!(share["media"][0]["originalUrl"], "https://example.com/post");
        assert_eq!(share["shareCommentary"]["text"], "Read this.\n\n#rust");
    }

    #[tokio::test]
    async fn test_author_resolved_from_userinfo() {
        let server = MockServer::start_async().await;
        let userinfo = server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/userinfo");
                then.status(200).json_body(json!({"sub": "abc123", "name": "Writer"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v2/ugcPosts")
                    .header("X-Restli-Protocol-Version", "2.0.0");
                then.status(201)
                    .header("x-restli-id", "urn:li:share:42")
                    .body("");
            })
            .await;

        let published = publisher(&server, None)
            .publish_content(&content(), PublishMode::Live)
            .await
            .unwrap();

        userinfo.assert_async().await;
        assert_eq!(published.id, "urn:li:share:42");
        assert_eq!(
            published.url.as_deref(),
            Some("https://www.linkedin.com/feed/update/urn:li:share:42")
        );
        assert_eq!(published.metadata["author"], "urn:li:person:abc123");
    }

    #[tokio::test]
    async fn test_configured_author_skips_userinfo_and_reads_body_id() {
        let server = MockServer::start_async().await;
        let userinfo = server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/userinfo");
                then.status(200).json_body(json!({"sub": "unused"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v2/ugcPosts");
                then.status(201).json_body(json!({"id": "urn:li:share:7"}));
            })
            .await;

        let published = publisher(&server, Some("urn:li:organization:9"))
            .publish_content(&content(), PublishMode::Live)
            .await
            .unwrap();

        userinfo.assert_calls_async(0).await;
        assert_eq!(published.id, "urn:li:share:7");
    }

    #[tokio::test]
    async fn test_staged_refused() {
        let server = MockServer::start_async().await;
        let err = publisher(&server, Some("urn:li:person:x"))
            .publish_content(&content(), PublishMode::Staged)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Configuration(_)));
        assert!(!err.is_retryable());
    }
}
