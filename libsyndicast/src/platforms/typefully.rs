//! Typefully platform implementation
//!
//! One draft fans out server-side to several networks. The response carries a
//! `<network>_published_url` field per network, filled only for networks that
//! actually went out, so a single success can be partial.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use super::http::{build_client, send_json};
use super::{ensure_env, ensure_valid, Published, Publisher, PublisherSettings};
use crate::content::{split_into_threads, MAX_THREAD_LENGTH};
use crate::credentials::{
    require_secret, require_value, EnvSource, TYPEFULLY_API_KEY, TYPEFULLY_SOCIAL_SET_ID,
};
use crate::error::PlatformError;
use crate::types::{Platform, PlatformContent, PublishMode};

pub const DEFAULT_BASE_URL: &str = "https://api.typefully.com";
const NAME: &str = "Typefully";

/// A network Typefully can post to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypefullyTarget {
    X,
    LinkedIn,
    Threads,
    Bluesky,
    Mastodon,
}

impl TypefullyTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypefullyTarget::X => "x",
            TypefullyTarget::LinkedIn => "linkedin",
            TypefullyTarget::Threads => "threads",
            TypefullyTarget::Bluesky => "bluesky",
            TypefullyTarget::Mastodon => "mastodon",
        }
    }

    /// Per-post character limit; `None` means a single long post
    fn post_limit(&self) -> Option<usize> {
        match self {
            TypefullyTarget::X => Some(280),
            TypefullyTarget::Threads | TypefullyTarget::Mastodon => Some(500),
            TypefullyTarget::Bluesky => Some(300),
            TypefullyTarget::LinkedIn => None,
        }
    }
}

/// When Typefully should publish the draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishAt {
    #[default]
    Now,
    NextFreeSlot,
    At(DateTime<Utc>),
}

impl fmt::Display for PublishAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishAt::Now => f.write_str("now"),
            PublishAt::NextFreeSlot => f.write_str("next-free-slot"),
            PublishAt::At(at) => f.write_str(&at.to_rfc3339()),
        }
    }
}

impl FromStr for PublishAt {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "now" => Ok(PublishAt::Now),
            "next-free-slot" => Ok(PublishAt::NextFreeSlot),
            other => DateTime::parse_from_rfc3339(other)
                .map(|at| PublishAt::At(at.with_timezone(&Utc)))
                .map_err(|_| {
                    format!(
                        "Invalid publish_at: '{}'. Use \"now\", \"next-free-slot\" or an ISO-8601 timestamp",
                        other
                    )
                }),
        }
    }
}

impl Serialize for PublishAt {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PublishAt {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Serialize)]
struct PlatformDraft {
    enabled: bool,
    posts: Vec<DraftPost>,
}

#[derive(Debug, Serialize)]
struct DraftPost {
    text: String,
}

#[derive(Debug, Serialize)]
struct CreateDraft {
    platforms: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    publish_at: Option<PublishAt>,
}

struct TypefullyCredentials {
    api_key: SecretString,
    social_set_id: String,
}

pub struct TypefullyPublisher {
    client: Client,
    base_url: String,
    credentials: Result<TypefullyCredentials, PlatformError>,
    targets: Vec<TypefullyTarget>,
    publish_at: PublishAt,
}

impl TypefullyPublisher {
    pub fn new(
        api_key: SecretString,
        social_set_id: String,
        targets: Vec<TypefullyTarget>,
        publish_at: PublishAt,
        settings: &PublisherSettings,
    ) -> Result<Self, PlatformError> {
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            credentials: Ok(TypefullyCredentials {
                api_key,
                social_set_id,
            }),
            targets,
            publish_at,
        })
    }

    pub fn from_env(
        env: &dyn EnvSource,
        targets: Vec<TypefullyTarget>,
        publish_at: PublishAt,
        settings: &PublisherSettings,
    ) -> Result<Self, PlatformError> {
        let credentials = ensure_env(env, Platform::Typefully, None).and_then(|_| {
            Ok(TypefullyCredentials {
                api_key: require_secret(env, TYPEFULLY_API_KEY)?,
                social_set_id: require_value(env, TYPEFULLY_SOCIAL_SET_ID)?,
            })
        });
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            credentials,
            targets,
            publish_at,
        })
    }

    fn credentials(&self) -> Result<&TypefullyCredentials, PlatformError> {
        self.credentials.as_ref().map_err(Clone::clone)
    }

    /// Per-network post lists for the draft body
    fn build_platforms(&self, content: &PlatformContent) -> Result<Map<String, Value>, PlatformError> {
        let mut footer = content.canonical_url.clone();
        if !content.tags.is_empty() {
            footer.push(' ');
            footer.push_str(&content.tags.join(" "));
        }
        let full = format!("{}\n\n{}", content.content.trim(), footer);

        let mut platforms = Map::new();
        for target in &self.targets {
            let texts = match target.post_limit() {
                Some(limit) => split_into_threads(&full, limit),
                None => vec![full.clone()],
            };
            if texts.len() > MAX_THREAD_LENGTH {
                return Err(PlatformError::Validation(format!(
                    "{}: {} thread would be {} posts (max {})",
                    NAME,
                    target.as_str(),
                    texts.len(),
                    MAX_THREAD_LENGTH
                )));
            }

            let draft = PlatformDraft {
                enabled: true,
                posts: texts.into_iter().map(|text| DraftPost { text }).collect(),
            };
            let value = serde_json::to_value(draft).map_err(|e| {
                PlatformError::Posting(format!("Failed to encode {} draft: {}", NAME, e))
            })?;
            platforms.insert(target.as_str().to_string(), value);
        }
        Ok(platforms)
    }
}

/// Split a draft response into published URLs and targets still missing one
pub fn extract_published_urls(
    response: &Map<String, Value>,
    targets: &[TypefullyTarget],
) -> (Map<String, Value>, Vec<String>) {
    let mut urls = Map::new();
    let mut missing = Vec::new();
    for target in targets {
        let key = format!("{}_published_url", target.as_str());
        match response.get(&key).and_then(Value::as_str) {
            Some(url) if !url.is_empty() => {
                urls.insert(target.as_str().to_string(), Value::String(url.to_string()));
            }
            _ => missing.push(target.as_str().to_string()),
        }
    }
    (urls, missing)
}

#[async_trait]
impl Publisher for TypefullyPublisher {
    fn platform(&self) -> Platform {
        Platform::Typefully
    }

    fn check_credentials(&self) -> Result<(), PlatformError> {
        self.credentials()?;
        if self.targets.is_empty() {
            return Err(PlatformError::Configuration(format!(
                "{} has no target platforms configured",
                NAME
            )));
        }
        Ok(())
    }

    async fn verify_remote(&self) -> Result<(), PlatformError> {
        let request = self
            .client
            .get(format!("{}/v2/me", self.base_url))
            .bearer_auth(self.credentials()?.api_key.expose_secret());
        let _: Value = send_json(NAME, request).await?;
        debug!(platform = "typefully", "[typefully] Credentials verified");
        Ok(())
    }

    fn supports_staging(&self) -> bool {
        true
    }

    fn check_content(&self, content: &PlatformContent) -> Result<(), PlatformError> {
        ensure_valid(content)?;
        self.build_platforms(content).map(|_| ())
    }

    async fn publish_content(
        &self,
        content: &PlatformContent,
        mode: PublishMode,
    ) -> Result<Published, PlatformError> {
        let credentials = self.credentials()?;
        let staged = mode == PublishMode::Staged;
        let body = CreateDraft {
            platforms: self.build_platforms(content)?,
            // Without publish_at the draft just sits in Typefully
            publish_at: (!staged).then_some(self.publish_at),
        };

        let request = self
            .client
            .post(format!(
                "{}/v2/social-sets/{}/drafts",
                self.base_url, credentials.social_set_id
            ))
            .bearer_auth(credentials.api_key.expose_secret())
            .json(&body);
        let response: Map<String, Value> = send_json(NAME, request).await?;

        let id = match response.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(PlatformError::Posting(format!(
                    "{} response carried no draft id",
                    NAME
                )))
            }
        };

        let (urls, missing) = extract_published_urls(&response, &self.targets);
        let url = self
            .targets
            .iter()
            .find_map(|t| urls.get(t.as_str()).and_then(Value::as_str))
            .or_else(|| response.get("share_url").and_then(Value::as_str))
            .or_else(|| response.get("private_url").and_then(Value::as_str))
            .map(str::to_string);

        // Scheduled or staged drafts have no URLs yet
        let partial = !staged && self.publish_at == PublishAt::Now && !urls.is_empty() && !missing.is_empty();
        if partial {
            warn!(
                platform = "typefully",
                missing = ?missing,
                "[typefully] Draft {} published to only some platforms",
                id
            );
        }

        let mut published = Published::new(&id, url)
            .with_metadata("draftId", id.clone())
            .with_metadata("publishedUrls", Value::Object(urls))
            .with_metadata(
                "missingPlatforms",
                Value::Array(missing.into_iter().map(Value::String).collect()),
            );
        if staged {
            published = published.with_metadata("draft", true);
        }
        if let Some(status) = response.get("status") {
            published = published.with_metadata("status", status.clone());
        }
        published.partial = partial;
        Ok(published)
    }
}
