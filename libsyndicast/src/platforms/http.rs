//! Shared HTTP plumbing for the platform clients
//!
//! Failures are classified here, where the response is in hand, so the retry
//! policy only ever sees typed errors.
//!
//! # Status mapping
//!
//! - 401/403 → `PlatformError::Authentication`
//! - 422 → `PlatformError::Validation`
//! - 429 → `PlatformError::RateLimit` (with `Retry-After` seconds when sent)
//! - 408, 5xx → `PlatformError::Network`
//! - any other non-success → `PlatformError::Posting`
//! - client timeouts → `PlatformError::Timeout`, connection failures → `PlatformError::Network`

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::PlatformError;

const USER_AGENT: &str = concat!("syndicast/", env!("CARGO_PKG_VERSION"));
/// Longest response body quoted in an error message
const MAX_ERROR_BODY: usize = 300;

/// Build the client every publisher shares
pub fn build_client(timeout: Duration) -> Result<Client, PlatformError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| PlatformError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// Strip trailing slashes so paths can be appended with `format!`
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Send a request and turn any non-success status into a typed error
pub async fn send(name: &str, request: RequestBuilder) -> Result<Response, PlatformError> {
    let response = request.send().await.map_err(|e| map_reqwest_error(name, e))?;
    check_status(name, response).await
}

/// Send a request and decode a JSON success body
pub async fn send_json<T: DeserializeOwned>(
    name: &str,
    request: RequestBuilder,
) -> Result<T, PlatformError> {
    let response = send(name, request).await?;
    decode_json(name, response).await
}

pub async fn decode_json<T: DeserializeOwned>(
    name: &str,
    response: Response,
) -> Result<T, PlatformError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| map_reqwest_error(name, e))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        PlatformError::Posting(format!("{} returned an unexpected response: {}", name, e))
    })
}

/// Pass a success through; classify everything else
pub async fn check_status(name: &str, response: Response) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();

    Err(classify_status(name, status, retry_after, &body))
}

/// Map an HTTP failure to the error taxonomy
pub fn classify_status(
    name: &str,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> PlatformError {
    let detail = format!("{} returned {}: {}", name, status, truncate(body));
    match status.as_u16() {
        401 | 403 => PlatformError::Authentication(detail),
        422 => PlatformError::Validation(detail),
        429 => PlatformError::RateLimit {
            message: detail,
            retry_after,
        },
        408 | 500..=599 => PlatformError::Network(detail),
        _ => PlatformError::Posting(detail),
    }
}

pub fn map_reqwest_error(name: &str, error: reqwest::Error) -> PlatformError {
    if error.is_timeout() {
        PlatformError::Timeout(format!("{} did not answer in time: {}", name, error))
    } else if error.is_decode() {
        PlatformError::Posting(format!("{} returned an unreadable response: {}", name, error))
    } else if error.is_builder() {
        PlatformError::Configuration(format!("Invalid {} request: {}", name, error))
    } else {
        PlatformError::Network(format!("Could not reach {}: {}", name, error))
    }
}

/// `Retry-After` in delta-seconds; HTTP-date values are ignored
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let cut: String = body.chars().take(MAX_ERROR_BODY).collect();
    format!("{}...", cut)
}
