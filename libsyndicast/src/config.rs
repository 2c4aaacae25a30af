//! Configuration management for Syndicast
//!
//! Every section is optional; a missing file or an empty section falls back
//! to built-in defaults. Credentials never live here, see [`crate::credentials`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::platforms::newsletter::NewsletterProvider;
use crate::platforms::typefully::{PublishAt, TypefullyTarget};
use crate::rate_limiter::RateLimitConfig;
use crate::retry::RetryConfig;
use crate::types::Platform;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PUBLISH_DEADLINE_SECS: u64 = 300;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub defaults: DefaultsConfig,
    pub devto: PlatformConfig,
    pub medium: PlatformConfig,
    pub hashnode: PlatformConfig,
    pub twitter: PlatformConfig,
    pub linkedin: PlatformConfig,
    pub typefully: TypefullyConfig,
    pub newsletter: NewsletterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Root of the per-slug `publish-log.json` tree
    pub dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: "~/.local/share/syndicast/publish-logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Platforms used when none are named on the command line
    pub platforms: Vec<String>,
    pub request_timeout_secs: u64,
    pub publish_deadline_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            platforms: vec!["devto".to_string()],
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            publish_deadline_secs: DEFAULT_PUBLISH_DEADLINE_SECS,
        }
    }
}

/// Settings shared by every platform section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub enabled: bool,
    /// Override the API root (self-hosted proxies, test servers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            rate_limit: None,
            retry: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TypefullyConfig {
    #[serde(flatten)]
    pub platform: PlatformConfig,
    /// Networks the draft is fanned out to
    pub targets: Vec<TypefullyTarget>,
    pub publish_at: PublishAt,
}

impl Default for TypefullyConfig {
    fn default() -> Self {
        Self {
            platform: PlatformConfig::default(),
            targets: vec![TypefullyTarget::X, TypefullyTarget::LinkedIn],
            publish_at: PublishAt::Now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsletterConfig {
    #[serde(flatten)]
    pub platform: PlatformConfig,
    /// Falls back to the `NEWSLETTER_PROVIDER` environment variable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<NewsletterProvider>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load an explicit path, or the default path if it exists, or defaults
    ///
    /// An explicitly named file that cannot be read is an error; a missing
    /// file at the default location is not.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }
        let path = resolve_config_path()?;
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or break the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.defaults.request_timeout_secs == 0 {
            return Err(invalid("defaults.request_timeout_secs", "must be greater than 0"));
        }
        if self.defaults.publish_deadline_secs == 0 {
            return Err(invalid("defaults.publish_deadline_secs", "must be greater than 0"));
        }
        for name in &self.defaults.platforms {
            name.parse::<Platform>()
                .map_err(|message| invalid("defaults.platforms", &message))?;
        }

        for platform in Platform::ALL {
            let section = self.platform(platform);
            if let Some(retry) = &section.retry {
                if retry.max_retries == 0 {
                    return Err(invalid(
                        &format!("{}.retry.max_retries", platform),
                        "must allow at least one attempt",
                    ));
                }
                if retry.backoff_multiplier < 1.0 {
                    return Err(invalid(
                        &format!("{}.retry.backoff_multiplier", platform),
                        "must be at least 1.0",
                    ));
                }
                if retry.initial_delay_ms > retry.max_delay_ms {
                    return Err(invalid(
                        &format!("{}.retry.initial_delay_ms", platform),
                        "must not exceed max_delay_ms",
                    ));
                }
            }
            if let Some(limit) = &section.rate_limit {
                if limit.window_ms == 0 {
                    return Err(invalid(
                        &format!("{}.rate_limit.window_ms", platform),
                        "must be greater than 0",
                    ));
                }
            }
        }

        Ok(())
    }

    /// The shared section for a platform
    pub fn platform(&self, platform: Platform) -> &PlatformConfig {
        match platform {
            Platform::DevTo => &self.devto,
            Platform::Medium => &self.medium,
            Platform::Hashnode => &self.hashnode,
            Platform::Twitter => &self.twitter,
            Platform::LinkedIn => &self.linkedin,
            Platform::Typefully => &self.typefully.platform,
            Platform::Newsletter => &self.newsletter.platform,
        }
    }

    pub fn rate_limit_for(&self, platform: Platform) -> RateLimitConfig {
        self.platform(platform)
            .rate_limit
            .unwrap_or_else(|| RateLimitConfig::for_platform(platform))
    }

    pub fn retry_for(&self, platform: Platform) -> RetryConfig {
        self.platform(platform).retry.unwrap_or_default()
    }

    pub fn base_url_for(&self, platform: Platform) -> Option<&str> {
        self.platform(platform).base_url.as_deref()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.request_timeout_secs)
    }

    pub fn publish_deadline(&self) -> Duration {
        Duration::from_secs(self.defaults.publish_deadline_secs)
    }

    /// Default platforms, minus any whose section is disabled
    pub fn default_platforms(&self) -> Result<Vec<Platform>> {
        let mut platforms = Vec::new();
        for name in &self.defaults.platforms {
            let platform: Platform = name
                .parse()
                .map_err(|message: String| invalid("defaults.platforms", &message))?;
            if self.platform(platform).enabled && !platforms.contains(&platform) {
                platforms.push(platform);
            }
        }
        Ok(platforms)
    }

    /// Expanded publish log root
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.log.dir).to_string())
    }
}

fn invalid(field: &str, message: &str) -> crate::error::SyndicastError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SYNDICAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("syndicast").join("config.toml"))
}
