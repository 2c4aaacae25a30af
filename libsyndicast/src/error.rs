//! Error types for Syndicast

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyndicastError>;

#[derive(Error, Debug)]
pub enum SyndicastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Publish log error: {0}")]
    Log(#[from] LogError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SyndicastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SyndicastError::InvalidInput(_) => 3,
            SyndicastError::Platform(PlatformError::Authentication(_)) => 2,
            SyndicastError::Platform(_) => 1,
            SyndicastError::Config(_) => 1,
            SyndicastError::Log(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Failures reading or writing `publish-log.json`
///
/// Writes that fail after a platform accepted the content are logged and
/// swallowed by the pipeline; these only surface from direct store calls.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed publish log {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid slug: {0}")]
    InvalidSlug(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Configuration invalid: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Thread interrupted at post {failed_index}/{total}: {reason}")]
    ThreadInterrupted {
        /// 1-based index of the chunk that failed
        failed_index: usize,
        total: usize,
        /// IDs of the chunks that were posted before the failure
        posted_ids: Vec<String>,
        reason: String,
    },

    /// A multi-step publish failed after its first step created something
    /// remotely; repeating the whole publish would create it again
    #[error("Publish incomplete: {step} failed after creating {created_id}: {reason}")]
    Incomplete {
        created_id: String,
        step: String,
        reason: String,
    },

    #[error("Publish cancelled: {0}")]
    Cancelled(String),
}

impl PlatformError {
    /// Whether another attempt may succeed
    ///
    /// Credential, content and partially-applied publishes are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            PlatformError::Network(_)
            | PlatformError::Timeout(_)
            | PlatformError::RateLimit { .. }
            | PlatformError::Posting(_) => true,
            PlatformError::Configuration(_)
            | PlatformError::Authentication(_)
            | PlatformError::Validation(_)
            | PlatformError::ThreadInterrupted { .. }
            | PlatformError::Incomplete { .. }
            | PlatformError::Cancelled(_) => false,
        }
    }

    /// Server-provided delay before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PlatformError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            PlatformError::Configuration(_) => "configuration",
            PlatformError::Authentication(_) => "authentication",
            PlatformError::Validation(_) => "validation",
            PlatformError::Posting(_) => "posting",
            PlatformError::Network(_) => "network",
            PlatformError::Timeout(_) => "timeout",
            PlatformError::RateLimit { .. } => "rate_limit",
            PlatformError::ThreadInterrupted { .. } => "thread_interrupted",
            PlatformError::Incomplete { .. } => "incomplete",
            PlatformError::Cancelled(_) => "cancelled",
        }
    }
}
