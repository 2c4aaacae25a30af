//! Newsletter publisher
//!
//! One publisher fronts three providers. The provider comes from the
//! `[newsletter]` config section or, failing that, `NEWSLETTER_PROVIDER`, and
//! decides which credentials are required.
//!
//! | Provider   | Live                                  | Staged        |
//! |------------|---------------------------------------|---------------|
//! | Buttondown | email with status `about_to_send`     | draft email   |
//! | Mailchimp  | campaign + content + send action      | campaign only |
//! | Substack   | draft + publish                       | draft only    |
//!
//! Once the first step has created a campaign or draft, a failure in a later
//! step surfaces as `PlatformError::Incomplete` so the pipeline does not
//! retry the whole sequence and create a duplicate.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use pulldown_cmark::{html, Event, Options, Parser};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use super::http::{build_client, normalize_base_url, send, send_json};
use super::{ensure_env, Published, Publisher, PublisherSettings};
use crate::credentials::{
    optional_value, require_secret, require_value, EnvSource, BUTTONDOWN_API_KEY,
    MAILCHIMP_API_KEY, MAILCHIMP_LIST_ID, NEWSLETTER_PROVIDER, SUBSTACK_PUBLICATION_URL,
    SUBSTACK_SESSION_COOKIE,
};
use crate::error::PlatformError;
use crate::types::{Platform, PlatformContent, PublishMode};

pub const BUTTONDOWN_BASE_URL: &str = "https://api.buttondown.email";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsletterProvider {
    Substack,
    Buttondown,
    Mailchimp,
}

impl NewsletterProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            NewsletterProvider::Substack => "substack",
            NewsletterProvider::Buttondown => "buttondown",
            NewsletterProvider::Mailchimp => "mailchimp",
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            NewsletterProvider::Substack => "Substack",
            NewsletterProvider::Buttondown => "Buttondown",
            NewsletterProvider::Mailchimp => "Mailchimp",
        }
    }
}

impl fmt::Display for NewsletterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NewsletterProvider {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "substack" => Ok(NewsletterProvider::Substack),
            "buttondown" => Ok(NewsletterProvider::Buttondown),
            "mailchimp" => Ok(NewsletterProvider::Mailchimp),
            other => Err(PlatformError::Configuration(format!(
                "Unknown newsletter provider '{}'. Expected substack, buttondown or mailchimp",
                other
            ))),
        }
    }
}

/// Resolve the provider from config, then the environment
pub fn resolve_provider(
    configured: Option<NewsletterProvider>,
    env: &dyn EnvSource,
) -> Result<Option<NewsletterProvider>, PlatformError> {
    if configured.is_some() {
        return Ok(configured);
    }
    optional_value(env, NEWSLETTER_PROVIDER)
        .map(|raw| raw.parse())
        .transpose()
}

enum Backend {
    Buttondown {
        api_key: SecretString,
        base_url: String,
    },
    Mailchimp {
        api_key: SecretString,
        list_id: String,
        base_url: String,
    },
    Substack {
        cookie: SecretString,
        base_url: String,
    },
}

impl Backend {
    fn provider(&self) -> NewsletterProvider {
        match self {
            Backend::Buttondown { .. } => NewsletterProvider::Buttondown,
            Backend::Mailchimp { .. } => NewsletterProvider::Mailchimp,
            Backend::Substack { .. } => NewsletterProvider::Substack,
        }
    }
}

/// Mailchimp keys end in `-<datacenter>`, which picks the API host
fn mailchimp_base_url(api_key: &str) -> Result<String, PlatformError> {
    match api_key.rsplit_once('-') {
        Some((_, dc)) if !dc.is_empty() => Ok(format!("https://{}.api.mailchimp.com/3.0", dc)),
        _ => Err(PlatformError::Configuration(format!(
            "{} has no datacenter suffix (expected '<key>-<dc>')",
            MAILCHIMP_API_KEY
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct ButtondownEmail {
    id: String,
    #[serde(default)]
    absolute_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MailchimpCampaign {
    id: String,
    #[serde(default)]
    archive_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubstackDraft {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct SubstackPost {
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    canonical_url: Option<String>,
}

pub struct NewsletterPublisher {
    client: Client,
    backend: Result<Backend, PlatformError>,
}

impl NewsletterPublisher {
    pub fn from_env(
        env: &dyn EnvSource,
        configured: Option<NewsletterProvider>,
        settings: &PublisherSettings,
    ) -> Result<Self, PlatformError> {
        let backend = resolve_provider(configured, env).and_then(|provider| {
            ensure_env(env, Platform::Newsletter, provider)?;
            // ensure_env demands NEWSLETTER_PROVIDER when none resolved
            let provider = provider.ok_or_else(|| {
                PlatformError::Configuration("Newsletter provider is not set".to_string())
            })?;
            build_backend(env, provider, settings)
        });
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            backend,
        })
    }

    pub fn provider(&self) -> Option<NewsletterProvider> {
        self.backend.as_ref().ok().map(Backend::provider)
    }

    fn backend(&self) -> Result<&Backend, PlatformError> {
        self.backend.as_ref().map_err(Clone::clone)
    }

    async fn publish_buttondown(
        &self,
        api_key: &SecretString,
        base_url: &str,
        content: &PlatformContent,
        mode: PublishMode,
    ) -> Result<Published, PlatformError> {
        let status = if mode == PublishMode::Staged {
            "draft"
        } else {
            "about_to_send"
        };
        let request = buttondown_auth(self.client.post(format!("{}/v1/emails", base_url)), api_key)
            .json(&json!({
                "subject": content.title,
                "body": content.content,
                "status": status,
            }));
        let email: ButtondownEmail = send_json("Buttondown", request).await?;
        Ok(Published::new(&email.id, email.absolute_url).with_metadata("status", status))
    }

    async fn publish_mailchimp(
        &self,
        api_key: &SecretString,
        list_id: &str,
        base_url: &str,
        content: &PlatformContent,
        mode: PublishMode,
    ) -> Result<Published, PlatformError> {
        let create = self
            .client
            .post(format!("{}/campaigns", base_url))
            .basic_auth("syndicast", Some(api_key.expose_secret()))
            .json(&json!({
                "type": "regular",
                "recipients": { "list_id": list_id },
                "settings": {
                    "subject_line": content.title,
                    "title": content.slug,
                    "preview_text": content.excerpt.clone().unwrap_or_default(),
                },
            }));
        let campaign: MailchimpCampaign = send_json("Mailchimp", create).await?;

        let set_content = self
            .client
            .put(format!("{}/campaigns/{}/content", base_url, campaign.id))
            .basic_auth("syndicast", Some(api_key.expose_secret()))
            .json(&json!({ "html": markdown_to_html(&content.content) }));
        send("Mailchimp", set_content)
            .await
            .map_err(|e| incomplete("Mailchimp", &campaign.id, "content", e))?;

        let sent = mode != PublishMode::Staged;
        if sent {
            let send_action = self
                .client
                .post(format!("{}/campaigns/{}/actions/send", base_url, campaign.id))
                .basic_auth("syndicast", Some(api_key.expose_secret()));
            send("Mailchimp", send_action)
                .await
                .map_err(|e| incomplete("Mailchimp", &campaign.id, "send", e))?;
        }

        Ok(Published::new(&campaign.id, campaign.archive_url).with_metadata("sent", sent))
    }

    async fn publish_substack(
        &self,
        cookie: &SecretString,
        base_url: &str,
        content: &PlatformContent,
        mode: PublishMode,
    ) -> Result<Published, PlatformError> {
        let create = substack_auth(self.client.post(format!("{}/api/v1/drafts", base_url)), cookie)
            .json(&json!({
                "draft_title": content.title,
                "draft_subtitle": content.excerpt.clone().unwrap_or_default(),
                "draft_body": markdown_to_html(&content.content),
                "audience": "everyone",
                "type": "newsletter",
            }));
        let draft: SubstackDraft = send_json("Substack", create).await?;
        let id = draft.id.to_string();

        if mode == PublishMode::Staged {
            let url = format!("{}/publish/post/{}", base_url, id);
            return Ok(Published::new(&id, Some(url)).with_metadata("draft", true));
        }

        let publish = substack_auth(
            self.client
                .post(format!("{}/api/v1/drafts/{}/publish", base_url, id)),
            cookie,
        )
        .json(&json!({ "send": true, "share_automatically": false }));
        let post: SubstackPost = send_json("Substack", publish)
            .await
            .map_err(|e| incomplete("Substack", &id, "publish", e))?;
        let url = post.canonical_url.unwrap_or_else(|| {
            format!(
                "{}/p/{}",
                base_url,
                post.slug.as_deref().unwrap_or(&content.slug)
            )
        });
        Ok(Published::new(&id, Some(url)).with_metadata("draft", false))
    }
}

fn build_backend(
    env: &dyn EnvSource,
    provider: NewsletterProvider,
    settings: &PublisherSettings,
) -> Result<Backend, PlatformError> {
    match provider {
        NewsletterProvider::Buttondown => Ok(Backend::Buttondown {
            api_key: require_secret(env, BUTTONDOWN_API_KEY)?,
            base_url: settings.base_url_or(BUTTONDOWN_BASE_URL),
        }),
        NewsletterProvider::Mailchimp => {
            let api_key = require_secret(env, MAILCHIMP_API_KEY)?;
            let base_url = match &settings.base_url {
                Some(url) => normalize_base_url(url),
                None => mailchimp_base_url(api_key.expose_secret())?,
            };
            Ok(Backend::Mailchimp {
                api_key,
                list_id: require_value(env, MAILCHIMP_LIST_ID)?,
                base_url,
            })
        }
        NewsletterProvider::Substack => {
            let publication = require_value(env, SUBSTACK_PUBLICATION_URL)?;
            Ok(Backend::Substack {
                cookie: require_secret(env, SUBSTACK_SESSION_COOKIE)?,
                base_url: settings.base_url_or(&publication),
            })
        }
    }
}

fn buttondown_auth(request: RequestBuilder, api_key: &SecretString) -> RequestBuilder {
    request.header("Authorization", format!("Token {}", api_key.expose_secret()))
}

fn substack_auth(request: RequestBuilder, cookie: &SecretString) -> RequestBuilder {
    request.header("Cookie", format!("substack.sid={}", cookie.expose_secret()))
}

/// Wrap a transient failure from a step that runs after something was created
///
/// Permanent errors pass through untouched; they are not retried anyway.
fn incomplete(provider: &str, created_id: &str, step: &str, error: PlatformError) -> PlatformError {
    if !error.is_retryable() {
        return error;
    }
    warn!(
        platform = "newsletter",
        created_id,
        step,
        "[newsletter] {} {} step failed after creating {}: {}",
        provider,
        step,
        created_id,
        error
    );
    PlatformError::Incomplete {
        created_id: created_id.to_string(),
        step: step.to_string(),
        reason: error.to_string(),
    }
}

/// Render markdown to an HTML email body. Raw HTML in the source is escaped.
fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let events = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) => Event::Text(raw),
        other => other,
    });
    let mut body = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut body, events);
    body.truncate(body.trim_end().len());
    body
}

#[async_trait]
impl Publisher for NewsletterPublisher {
    fn platform(&self) -> Platform {
        Platform::Newsletter
    }

    fn check_credentials(&self) -> Result<(), PlatformError> {
        self.backend().map(|_| ())
    }

    async fn verify_remote(&self) -> Result<(), PlatformError> {
        let backend = self.backend()?;
        match backend {
            Backend::Buttondown { api_key, base_url } => {
                let request =
                    buttondown_auth(self.client.get(format!("{}/v1/newsletters", base_url)), api_key);
                send("Buttondown", request).await?;
            }
            Backend::Mailchimp {
                api_key, base_url, ..
            } => {
                let request = self
                    .client
                    .get(format!("{}/ping", base_url))
                    .basic_auth("syndicast", Some(api_key.expose_secret()));
                send("Mailchimp", request).await?;
            }
            Backend::Substack { cookie, base_url } => {
                let request =
                    substack_auth(self.client.get(format!("{}/api/v1/drafts", base_url)), cookie);
                send("Substack", request).await?;
            }
        }
        debug!(
            platform = "newsletter",
            provider = %backend.provider(),
            "[newsletter] {} credentials verified",
            backend.provider().display_name()
        );
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
        let backend = self.backend()?;
        let published = match backend {
            Backend::Buttondown { api_key, base_url } => {
                self.publish_buttondown(api_key, base_url, content, mode)
                    .await?
            }
            Backend::Mailchimp {
                api_key,
                list_id,
                base_url,
            } => {
                self.publish_mailchimp(api_key, list_id, base_url, content, mode)
                    .await?
            }
            Backend::Substack { cookie, base_url } => {
                self.publish_substack(cookie, base_url, content, mode)
                    .await?
            }
        };
        Ok(published.with_metadata("provider", backend.provider().as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn settings(server: &MockServer) -> PublisherSettings {
        PublisherSettings {
            base_url: Some(server.base_url()),
            ..Default::default()
        }
    }

    fn content() -> PlatformContent {
        PlatformContent::new(
            Platform::Newsletter,
            "issue-1",
            "Issue #1",
            "Hello <readers> & friends.\n\nSecond paragraph.",
            "https://example.com/issue-1",
        )
    }

    #[test]
    fn test_provider_from_config_wins_over_env() {
        let env = env(&[(NEWSLETTER_PROVIDER, "substack")]);
        let provider = resolve_provider(Some(NewsletterProvider::Mailchimp), &env).unwrap();
        assert_eq!(provider, Some(NewsletterProvider::Mailchimp));
        assert_eq!(
            resolve_provider(None, &env).unwrap(),
            Some(NewsletterProvider::Substack)
        );
    }

    #[test]
    fn test_unknown_provider_is_configuration_error() {
        let env = env(&[(NEWSLETTER_PROVIDER, "tinyletter")]);
        let publisher =
            NewsletterPublisher::from_env(&env, None, &PublisherSettings::default()).unwrap();
        let err = publisher.check_credentials().unwrap_err();
        assert!(matches!(err, PlatformError::Configuration(_)));
        assert!(err.to_string().contains("tinyletter"));
    }

    #[test]
    fn test_provider_specific_credentials_checked() {
        let env = env(&[
            (NEWSLETTER_PROVIDER, "mailchimp"),
            (BUTTONDOWN_API_KEY, "bd-key"),
        ]);
        let publisher =
            NewsletterPublisher::from_env(&env, None, &PublisherSettings::default()).unwrap();
        let err = publisher.check_credentials().unwrap_err();
        assert!(err.to_string().contains(MAILCHIMP_API_KEY));
        assert!(err.to_string().contains(MAILCHIMP_LIST_ID));
    }

    #[test]
    fn test_mailchimp_datacenter_from_key() {
        assert_eq!(
            mailchimp_base_url("0123abcd-us21").unwrap(),
            "https://us21.api.mailchimp.com/3.0"
        );
        assert!(mailchimp_base_url("nodatacenter").is_err());
    }

    #[test]
    fn test_html_is_escaped_per_paragraph() {
        let html = markdown_to_html("A <b> & c\n\nNext");
        assert_eq!(html, "<p>A &lt;b&gt; &amp; c</p>\n<p>Next</p>");
    }

    #[test]
    fn test_html_keeps_markdown_structure() {
        let html = markdown_to_html(
            "# Title\n\nSee [the docs](https://example.com/docs) and `cargo`.\n\n```\nfn main() {}\n```",
        );
        assert!(html.starts_with("<h1>Title</h1>"));
        assert!(html.contains(r#"<a href="https://example.com/docs">the docs</a>"#));
        assert!(html.contains("<code>cargo</code>"));
        assert!(html.contains("<pre><code>fn main() {}\n</code></pre>"));
    }

    #[test]
    fn test_raw_html_block_is_escaped() {
        let html = markdown_to_html("<script>alert(1)</script>\n\nAfter");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("<p>After</p>"));
    }

    #[tokio::test]
    async fn test_buttondown_live_sends() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/emails")
                    .header("authorization", "Token bd-key")
                    .json_body_includes(r#"{"status":"about_to_send","subject":"Issue #1"}"#);
                then.status(201).json_body(json!({
                    "id": "em_1",
                    "absolute_url": "https://buttondown.email/me/archive/issue-1"
                }));
            })
            .await;

        let env = env(&[(BUTTONDOWN_API_KEY, "bd-key")]);
        let publisher = NewsletterPublisher::from_env(
            &env,
            Some(NewsletterProvider::Buttondown),
            &settings(&server),
        )
        .unwrap();
        let published = publisher
            .publish_content(&content(), PublishMode::Live)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(published.id, "em_1");
        assert_eq!(published.metadata["provider"], "buttondown");
    }

    #[tokio::test]
    async fn test_mailchimp_staged_skips_send_action() {
        let server = MockServer::start_async().await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/campaigns")
                    .json_body_includes(r#"{"recipients":{"list_id":"list-9"}}"#);
                then.status(200).json_body(json!({
                    "id": "c1",
                    "archive_url": "https://eepurl.com/c1"
                }));
            })
            .await;
        let content_mock = server
            .mock_async(|when, then| {
                when.method(PUT).path("/campaigns/c1/content");
                then.status(200).json_body(json!({}));
            })
            .await;
        let send_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/campaigns/c1/actions/send");
                then.status(204);
            })
            .await;

        let env = env(&[(MAILCHIMP_API_KEY, "key-us1"), (MAILCHIMP_LIST_ID, "list-9")]);
        let publisher = NewsletterPublisher::from_env(
            &env,
            Some(NewsletterProvider::Mailchimp),
            &settings(&server),
        )
        .unwrap();
        let published = publisher
            .publish_content(&content(), PublishMode::Staged)
            .await
            .unwrap();

        create.assert_async().await;
        content_mock.assert_async().await;
        send_mock.assert_calls_async(0).await;
        assert_eq!(published.metadata["sent"], false);
        assert_eq!(published.url.as_deref(), Some("https://eepurl.com/c1"));
    }

    #[tokio::test]
    async fn test_substack_publish_uses_cookie() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/drafts")
                    .header("cookie", "substack.sid=sid-1");
                then.status(200).json_body(json!({ "id": 314 }));
            })
            .await;
        let publish = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/drafts/314/publish");
                then.status(200).json_body(json!({ "slug": "issue-1" }));
            })
            .await;

        let env = env(&[
            (SUBSTACK_PUBLICATION_URL, "https://unused.substack.com"),
            (SUBSTACK_SESSION_COOKIE, "sid-1"),
        ]);
        let publisher = NewsletterPublisher::from_env(
            &env,
            Some(NewsletterProvider::Substack),
            &settings(&server),
        )
        .unwrap();
        let published = publisher
            .publish_content(&content(), PublishMode::Live)
            .await
            .unwrap();

        publish.assert_async().await;
        assert_eq!(published.id, "314");
        assert_eq!(
            published.url,
            Some(format!("{}/p/issue-1", server.base_url()))
        );
    }

    #[tokio::test]
    async fn test_mailchimp_failed_send_is_not_retried() {
        use crate::pipeline::PublishPipeline;
        use crate::publish_log::PublishLogStore;
        use crate::retry::RetryConfig;
        use std::sync::Arc;

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(200).json_body(json!({ "health_status": "ok" }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST).path("/campaigns");
                then.status(200).json_body(json!({ "id": "c7" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/campaigns/c7/content");
                then.status(200).json_body(json!({}));
            })
            .await;
        let send_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/campaigns/c7/actions/send");
                then.status(503).body("unavailable");
            })
            .await;

        let env = env(&[(MAILCHIMP_API_KEY, "key-us1"), (MAILCHIMP_LIST_ID, "list-9")]);
        let publisher = NewsletterPublisher::from_env(
            &env,
            Some(NewsletterProvider::Mailchimp),
            &settings(&server),
        )
        .unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let pipeline = PublishPipeline::new(
            Arc::new(publisher),
            Arc::new(PublishLogStore::new(dir.path())),
        )
        .with_retry(RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        });

        let result = pipeline.publish(&content()).await;

        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("incomplete"));
        assert_eq!(result.metadata["createdId"], "c7");
        assert_eq!(result.metadata["failedStep"], "send");
        create.assert_calls_async(1).await;
        send_mock.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn test_substack_publish_failure_reports_draft() {
        let server = MockServer::start_async().await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/drafts");
                then.status(200).json_body(json!({ "id": 99 }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/drafts/99/publish");
                then.status(502).body("bad gateway");
            })
            .await;

        let env = env(&[
            (SUBSTACK_PUBLICATION_URL, "https://unused.substack.com"),
            (SUBSTACK_SESSION_COOKIE, "sid-1"),
        ]);
        let publisher = NewsletterPublisher::from_env(
            &env,
            Some(NewsletterProvider::Substack),
            &settings(&server),
        )
        .unwrap();
        let err = publisher
            .publish_content(&content(), PublishMode::Live)
            .await
            .unwrap_err();

        create.assert_async().await;
        assert!(!err.is_retryable());
        match err {
            PlatformError::Incomplete {
                created_id, step, ..
            } => {
                assert_eq!(created_id, "99");
                assert_eq!(step, "publish");
            }
            other => panic!("expected Incomplete, got {:?}", other),
        }
    }
}
