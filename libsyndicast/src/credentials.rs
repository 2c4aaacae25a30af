//! Platform credentials from the environment
//!
//! Credentials are never read from the config file. Each platform declares the
//! environment variables it needs; values are wrapped in [`SecretString`] as
//! soon as they are read so they are zeroed on drop and never printed by
//! `Debug`.

use secrecy::SecretString;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::PlatformError;
use crate::platforms::newsletter::NewsletterProvider;
use crate::types::Platform;

pub const DEVTO_API_KEY: &str = "DEVTO_API_KEY";
pub const MEDIUM_INTEGRATION_TOKEN: &str = "MEDIUM_INTEGRATION_TOKEN";
pub const HASHNODE_TOKEN: &str = "HASHNODE_TOKEN";
pub const HASHNODE_PUBLICATION_ID: &str = "HASHNODE_PUBLICATION_ID";
pub const TWITTER_ACCESS_TOKEN: &str = "TWITTER_ACCESS_TOKEN";
pub const LINKEDIN_ACCESS_TOKEN: &str = "LINKEDIN_ACCESS_TOKEN";
/// Optional; resolved from the userinfo endpoint when absent
pub const LINKEDIN_AUTHOR_URN: &str = "LINKEDIN_AUTHOR_URN";
pub const TYPEFULLY_API_KEY: &str = "TYPEFULLY_API_KEY";
pub const TYPEFULLY_SOCIAL_SET_ID: &str = "TYPEFULLY_SOCIAL_SET_ID";
pub const NEWSLETTER_PROVIDER: &str = "NEWSLETTER_PROVIDER";
pub const BUTTONDOWN_API_KEY: &str = "BUTTONDOWN_API_KEY";
pub const MAILCHIMP_API_KEY: &str = "MAILCHIMP_API_KEY";
pub const MAILCHIMP_LIST_ID: &str = "MAILCHIMP_LIST_ID";
pub const SUBSTACK_PUBLICATION_URL: &str = "SUBSTACK_PUBLICATION_URL";
pub const SUBSTACK_SESSION_COOKIE: &str = "SUBSTACK_SESSION_COOKIE";

/// Source of environment values, swappable in tests
pub trait EnvSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Result of checking a platform's environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvCheck {
    pub valid: bool,
    pub missing: Vec<String>,
}

/// Variables a platform needs; the newsletter depends on its provider
pub fn required_env_vars(
    platform: Platform,
    provider: Option<NewsletterProvider>,
) -> Vec<&'static str> {
    match platform {
        Platform::DevTo => vec![DEVTO_API_KEY],
        Platform::Medium => vec![MEDIUM_INTEGRATION_TOKEN],
        Platform::Hashnode => vec![HASHNODE_TOKEN, HASHNODE_PUBLICATION_ID],
        Platform::Twitter => vec![TWITTER_ACCESS_TOKEN],
        Platform::LinkedIn => vec![LINKEDIN_ACCESS_TOKEN],
        Platform::Typefully => vec![TYPEFULLY_API_KEY, TYPEFULLY_SOCIAL_SET_ID],
        Platform::Newsletter => match provider {
            Some(NewsletterProvider::Buttondown) => vec![BUTTONDOWN_API_KEY],
            Some(NewsletterProvider::Mailchimp) => vec![MAILCHIMP_API_KEY, MAILCHIMP_LIST_ID],
            Some(NewsletterProvider::Substack) => {
                vec![SUBSTACK_PUBLICATION_URL, SUBSTACK_SESSION_COOKIE]
            }
            None => vec![NEWSLETTER_PROVIDER],
        },
    }
}

/// Check that every variable a platform needs is set and non-empty
pub fn validate_platform_env(
    env: &dyn EnvSource,
    platform: Platform,
    provider: Option<NewsletterProvider>,
) -> EnvCheck {
    let missing: Vec<String> = required_env_vars(platform, provider)
        .into_iter()
        .filter(|key| {
            env.get(key)
                .map(|value| value.trim().is_empty())
                .unwrap_or(true)
        })
        .map(str::to_string)
        .collect();

    EnvCheck {
        valid: missing.is_empty(),
        missing,
    }
}

/// Read a required secret
pub fn require_secret(env: &dyn EnvSource, key: &str) -> Result<SecretString, PlatformError> {
    require_value(env, key).map(SecretString::from)
}

/// Read a required non-secret value
pub fn require_value(env: &dyn EnvSource, key: &str) -> Result<String, PlatformError> {
    match env.get(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(PlatformError::Configuration(format!(
            "Missing environment variable {}",
            key
        ))),
    }
}

/// Read an optional value, treating blank as unset
pub fn optional_value(env: &dyn EnvSource, key: &str) -> Option<String> {
    env.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
