//! Syndicast - publish one blog post to many platforms
//!
//! This library adapts a canonical post for each distribution platform and
//! publishes it through a shared pipeline of rate limiting, retries, dry runs
//! and a durable per-slug publish log used for idempotent re-runs.

pub mod config;
pub mod content;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod platforms;
pub mod poster;
pub mod publish_log;
pub mod rate_limiter;
pub mod retry;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{PlatformError, Result, SyndicastError};
pub use pipeline::PublishPipeline;
pub use platforms::{Published, Publisher};
pub use poster::MultiPlatformPublisher;
pub use publish_log::PublishLogStore;
pub use types::{Platform, PlatformContent, PostMetadata, PublishMode, PublishReport, PublishResult};
