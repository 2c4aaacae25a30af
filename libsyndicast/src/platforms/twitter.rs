//! Twitter/X platform implementation
//!
//! Long content is posted as a reply chain. Each chunk after the first replies
//! to the one before it, so the thread is strictly sequential: once any chunk
//! is up, a later failure stops the thread and reports
//! [`PlatformError::ThreadInterrupted`] instead of retrying, which would post
//! the opening chunks twice.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::http::{build_client, send_json};
use super::{ensure_env, ensure_valid, staging_unsupported, Published, Publisher, PublisherSettings};
use crate::content::{split_into_threads, MAX_THREAD_LENGTH, TWEET_LENGTH};
use crate::credentials::{require_secret, EnvSource, TWITTER_ACCESS_TOKEN};
use crate::error::PlatformError;
use crate::types::{Platform, PlatformContent, PublishMode};

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";
const NAME: &str = "Twitter";
/// Room kept on every chunk for the ` [i/N]` counter
const COUNTER_RESERVE: usize = 8;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct TwitterUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateTweet<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<Reply<'a>>,
}

#[derive(Debug, Serialize)]
struct Reply<'a> {
    in_reply_to_tweet_id: &'a str,
}

/// Split content into numbered tweets with the link and hashtags at the end
///
/// Fails with a validation error when the thread would exceed
/// [`MAX_THREAD_LENGTH`] posts.
pub fn build_thread(content: &PlatformContent) -> Result<Vec<String>, PlatformError> {
    let budget = TWEET_LENGTH - COUNTER_RESERVE;

    let mut footer = content.canonical_url.trim().to_string();
    if !content.tags.is_empty() {
        if !footer.is_empty() {
            footer.push(' ');
        }
        footer.push_str(&content.tags.join(" "));
    }

    let mut chunks = split_into_threads(&content.content, budget);
    if !footer.is_empty() {
        let appended = chunks
            .last()
            .map(|last| format!("{}\n\n{}", last, footer))
            .filter(|joined| joined.chars().count() <= budget);
        match appended {
            Some(joined) => {
                if let Some(last) = chunks.last_mut() {
                    *last = joined;
                }
            }
            None => chunks.extend(split_into_threads(&footer, budget)),
        }
    }

    if chunks.is_empty() {
        return Err(PlatformError::Validation(format!("{}: nothing to post", NAME)));
    }
    if chunks.len() > MAX_THREAD_LENGTH {
        return Err(PlatformError::Validation(format!(
            "{}: thread would be {} posts (max {})",
            NAME,
            chunks.len(),
            MAX_THREAD_LENGTH
        )));
    }

    let total = chunks.len();
    if total > 1 {
        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.push_str(&format!(" [{}/{}]", i + 1, total));
        }
    }
    Ok(chunks)
}

pub struct TwitterPublisher {
    client: Client,
    base_url: String,
    token: Result<SecretString, PlatformError>,
}

impl TwitterPublisher {
    pub fn new(token: SecretString, settings: &PublisherSettings) -> Result<Self, PlatformError> {
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            token: Ok(token),
        })
    }

    pub fn from_env(env: &dyn EnvSource, settings: &PublisherSettings) -> Result<Self, PlatformError> {
        let token = ensure_env(env, Platform::Twitter, None)
            .and_then(|_| require_secret(env, TWITTER_ACCESS_TOKEN));
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

    async fn current_user(&self) -> Result<TwitterUser, PlatformError> {
        let request = self
            .client
            .get(format!("{}/2/users/me", self.base_url))
            .bearer_auth(self.token()?);
        let envelope: Envelope<TwitterUser> = send_json(NAME, request).await?;
        Ok(envelope.data)
    }

    async fn post_tweet(&self, text: &str, reply_to: Option<&str>) -> Result<String, PlatformError> {
        let body = CreateTweet {
            text,
            reply: reply_to.map(|id| Reply {
                in_reply_to_tweet_id: id,
            }),
        };
        let request = self
            .client
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(self.token()?)
            .json(&body);
        let envelope: Envelope<Tweet> = send_json(NAME, request).await?;
        Ok(envelope.data.id)
    }
}

#[async_trait]
impl Publisher for TwitterPublisher {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn check_credentials(&self) -> Result<(), PlatformError> {
        self.token().map(|_| ())
    }

    async fn verify_remote(&self) -> Result<(), PlatformError> {
        let user = self.current_user().await?;
        debug!(platform = "twitter", username = %user.username, "[twitter] Credentials verified");
        Ok(())
    }

    fn check_content(&self, content: &PlatformContent) -> Result<(), PlatformError> {
        ensure_valid(content)?;
        build_thread(content).map(|_| ())
    }

    async fn publish_content(
        &self,
        content: &PlatformContent,
        mode: PublishMode,
    ) -> Result<Published, PlatformError> {
        if mode == PublishMode::Staged {
            return Err(staging_unsupported(Platform::Twitter));
        }

        let chunks = build_thread(content)?;
        let user = self.current_user().await?;
        let total = chunks.len();

        let mut posted_ids: Vec<String> = Vec::with_capacity(total);
        for (i, chunk) in chunks.iter().enumerate() {
            let reply_to = posted_ids.last().map(String::as_str);
            match self.post_tweet(chunk, reply_to).await {
                Ok(id) => {
                    debug!(platform = "twitter", index = i + 1, total, tweet_id = %id, "[twitter] Posted {}/{}", i + 1, total);
                    posted_ids.push(id);
                }
                // Nothing is up yet, so the whole publish can safely be retried
                Err(e) if posted_ids.is_empty() => return Err(e),
                Err(e) => {
                    warn!(
                        platform = "twitter",
                        failed_index = i + 1,
                        total,
                        "[twitter] Thread stopped at {}/{}: {}",
                        i + 1,
                        total,
                        e
                    );
                    return Err(PlatformError::ThreadInterrupted {
                        failed_index: i + 1,
                        total,
                        posted_ids,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let first = posted_ids[0].clone();
        let url = format!("https://x.com/{}/status/{}", user.username, first);
        Ok(Published::new(&first, Some(url))
            .with_metadata("threadLength", total)
            .with_metadata(
                "tweetIds",
                Value::Array(posted_ids.into_iter().map(Value::String).collect()),
            ))
    }
}
