//! Hashnode platform implementation (GraphQL)
//!
//! GraphQL answers HTTP 200 even when the operation failed, so errors are read
//! from the `errors` array and classified by `extensions.code`.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::http::{build_client, send_json};
use super::{ensure_env, Published, Publisher, PublisherSettings};
use crate::credentials::{
    require_secret, require_value, EnvSource, HASHNODE_PUBLICATION_ID, HASHNODE_TOKEN,
};
use crate::error::PlatformError;
use crate::types::{Platform, PlatformContent, PublishMode};

pub const DEFAULT_BASE_URL: &str = "https://gql.hashnode.com";
const NAME: &str = "Hashnode";

const ME_QUERY: &str = "query Me { me { id username } }";

const CREATE_MUTATION: &str = r#"mutation CreatePublicationContent($input: CreatePublicationContentInput!) {
  createPublicationContent(input: $input) {
    post { id slug url }
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    extensions: Option<GraphQlExtensions>,
}

#[derive(Debug, Deserialize)]
struct GraphQlExtensions {
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeData {
    me: Option<HashnodeUser>,
}

#[derive(Debug, Deserialize)]
struct HashnodeUser {
    username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateData {
    create_publication_content: CreatePayload,
}

#[derive(Debug, Deserialize)]
struct CreatePayload {
    post: HashnodePost,
}

#[derive(Debug, Deserialize)]
struct HashnodePost {
    id: String,
    slug: String,
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateInput<'a> {
    publication_id: &'a str,
    title: &'a str,
    content_markdown: &'a str,
    tags: Vec<TagInput<'a>>,
    #[serde(rename = "originalArticleURL")]
    original_article_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtitle: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cover_image_options: Option<Value>,
    draft: bool,
}

#[derive(Debug, Serialize)]
struct TagInput<'a> {
    slug: &'a str,
    name: &'a str,
}

struct HashnodeCredentials {
    token: SecretString,
    publication_id: String,
}

pub struct HashnodePublisher {
    client: Client,
    base_url: String,
    credentials: Result<HashnodeCredentials, PlatformError>,
}

impl HashnodePublisher {
    pub fn new(
        token: SecretString,
        publication_id: String,
        settings: &PublisherSettings,
    ) -> Result<Self, PlatformError> {
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            credentials: Ok(HashnodeCredentials {
                token,
                publication_id,
            }),
        })
    }

    pub fn from_env(env: &dyn EnvSource, settings: &PublisherSettings) -> Result<Self, PlatformError> {
        let credentials = ensure_env(env, Platform::Hashnode, None).and_then(|_| {
            Ok(HashnodeCredentials {
                token: require_secret(env, HASHNODE_TOKEN)?,
                publication_id: require_value(env, HASHNODE_PUBLICATION_ID)?,
            })
        });
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            base_url: settings.base_url_or(DEFAULT_BASE_URL),
            credentials,
        })
    }

    fn credentials(&self) -> Result<&HashnodeCredentials, PlatformError> {
        self.credentials.as_ref().map_err(Clone::clone)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, PlatformError> {
        let credentials = self.credentials()?;
        let request = self
            .client
            .post(&self.base_url)
            .header("Authorization", credentials.token.expose_secret())
            .json(&json!({ "query": query, "variables": variables }));

        let response: GraphQlResponse<T> = send_json(NAME, request).await?;
        if let Some(error) = response.errors.first() {
            return Err(classify_graphql_error(error));
        }
        response.data.ok_or_else(|| {
            PlatformError::Posting(format!("{} returned neither data nor errors", NAME))
        })
    }
}

fn classify_graphql_error(error: &GraphQlError) -> PlatformError {
    let code = error
        .extensions
        .as_ref()
        .and_then(|e| e.code.as_deref())
        .unwrap_or("");
    let detail = format!("{} GraphQL error {}: {}", NAME, code, error.message);
    match code {
        "UNAUTHENTICATED" | "FORBIDDEN" => PlatformError::Authentication(detail),
        "BAD_USER_INPUT" | "GRAPHQL_VALIDATION_FAILED" => PlatformError::Validation(detail),
        "TOO_MANY_REQUESTS" | "RATE_LIMITED" => PlatformError::RateLimit {
            message: detail,
            retry_after: None,
        },
        "INTERNAL_SERVER_ERROR" | "SERVICE_UNAVAILABLE" => PlatformError::Network(detail),
        _ => PlatformError::Posting(detail),
    }
}

#[async_trait]
impl Publisher for HashnodePublisher {
    fn platform(&self) -> Platform {
        Platform::Hashnode
    }

    fn check_credentials(&self) -> Result<(), PlatformError> {
        self.credentials().map(|_| ())
    }

    async fn verify_remote(&self) -> Result<(), PlatformError> {
        let data: MeData = self.execute(ME_QUERY, json!({})).await?;
        match data.me {
            Some(user) => {
                tracing::debug!(platform = "hashnode", username = %user.username, "[hashnode] Credentials verified");
                Ok(())
            }
            None => Err(PlatformError::Authentication(format!(
                "{} token is not associated with a user",
                NAME
            ))),
        }
    }

    fn supports_staging(&self) -> bool {
        true
    }

    async fn publish_content(
        &self,
        content: &PlatformContent,
        mode: PublishMode,
    ) -> Result<Published, PlatformError> {
        let credentials = self.credentials()?;
        let input = CreateInput {
            publication_id: &credentials.publication_id,
            title: &content.title,
            content_markdown: &content.content,
            tags: content
                .tags
                .iter()
                .map(|tag| TagInput {
                    slug: tag,
                    name: tag,
                })
                .collect(),
            original_article_url: &content.canonical_url,
            subtitle: content.excerpt.as_deref(),
            cover_image_options: content
                .cover_image
                .as_ref()
                .map(|url| json!({ "coverImageURL": url })),
            draft: mode == PublishMode::Staged,
        };

        let data: CreateData = self
            .execute(CREATE_MUTATION, json!({ "input": input }))
            .await?;
        let post = data.create_publication_content.post;

        Ok(Published::new(&post.id, Some(post.url))
            .with_metadata("slug", post.slug)
            .with_metadata("draft", mode == PublishMode::Staged))
    }
}
