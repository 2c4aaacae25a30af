//! Core types for Syndicast

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Words per minute used for reading-time estimates
const READING_WORDS_PER_MINUTE: usize = 200;

/// A distribution target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    DevTo,
    Medium,
    Hashnode,
    Twitter,
    LinkedIn,
    Typefully,
    Newsletter,
}

impl Platform {
    pub const ALL: [Platform; 7] = [
        Platform::DevTo,
        Platform::Medium,
        Platform::Hashnode,
        Platform::Twitter,
        Platform::LinkedIn,
        Platform::Typefully,
        Platform::Newsletter,
    ];

    /// Lowercase identifier used in config, logs and `publish-log.json`
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::DevTo => "devto",
            Platform::Medium => "medium",
            Platform::Hashnode => "hashnode",
            Platform::Twitter => "twitter",
            Platform::LinkedIn => "linkedin",
            Platform::Typefully => "typefully",
            Platform::Newsletter => "newsletter",
        }
    }

    /// Human-facing name
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::DevTo => "Dev.to",
            Platform::Medium => "Medium",
            Platform::Hashnode => "Hashnode",
            Platform::Twitter => "Twitter",
            Platform::LinkedIn => "LinkedIn",
            Platform::Typefully => "Typefully",
            Platform::Newsletter => "Newsletter",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "devto" | "dev.to" | "dev" => Ok(Platform::DevTo),
            "medium" => Ok(Platform::Medium),
            "hashnode" => Ok(Platform::Hashnode),
            "twitter" | "x" => Ok(Platform::Twitter),
            "linkedin" => Ok(Platform::LinkedIn),
            "typefully" => Ok(Platform::Typefully),
            "newsletter" => Ok(Platform::Newsletter),
            other => Err(format!(
                "Unknown platform: '{}'. Valid options: devto, medium, hashnode, twitter, linkedin, typefully, newsletter",
                other
            )),
        }
    }
}

/// Whether network calls are issued, and in what form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishMode {
    /// Publish publicly
    #[default]
    Live,
    /// Validate and format only, never contact platform APIs
    DryRun,
    /// Create drafts on platforms that have them
    Staged,
}

impl FromStr for PublishMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" => Ok(PublishMode::Live),
            "dry-run" | "dryrun" | "dry_run" => Ok(PublishMode::DryRun),
            "staged" | "draft" => Ok(PublishMode::Staged),
            _ => Err(format!(
                "Invalid publish mode: '{}'. Valid options: live, dry-run, staged",
                s
            )),
        }
    }
}

impl fmt::Display for PublishMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishMode::Live => write!(f, "live"),
            PublishMode::DryRun => write!(f, "dry-run"),
            PublishMode::Staged => write!(f, "staged"),
        }
    }
}

/// Canonical description of a blog post prepared for distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMetadata {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub published_date: NaiveDate,
    pub canonical_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub word_count: usize,
    /// Estimated reading time in minutes
    #[serde(default)]
    pub reading_time: u32,
}

impl PostMetadata {
    /// Fill `word_count` and `reading_time` from the post body
    pub fn measure(mut self, body: &str) -> Self {
        let words = body.split_whitespace().count();
        self.word_count = words;
        self.reading_time = words.div_ceil(READING_WORDS_PER_MINUTE).max(1) as u32;
        self
    }
}

/// A per-platform rendering of a post
///
/// `valid` and `validation_errors` are only set by
/// [`crate::content::validate_content`], so `valid` always equals
/// `validation_errors.is_empty()` once validated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformContent {
    pub platform: Platform,
    pub slug: String,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    pub tags: Vec<String>,
    pub canonical_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub character_count: usize,
    valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    validation_errors: Vec<String>,
}

impl PlatformContent {
    /// Build unvalidated content; `character_count` is derived from `content`
    pub fn new(
        platform: Platform,
        slug: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        canonical_url: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            platform,
            slug: slug.into(),
            title: title.into(),
            character_count: content.chars().count(),
            content,
            excerpt: None,
            tags: Vec::new(),
            canonical_url: canonical_url.into(),
            cover_image: None,
            valid: false,
            validation_errors: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    pub fn with_cover_image(mut self, cover_image: Option<String>) -> Self {
        self.cover_image = cover_image;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn validation_errors(&self) -> &[String] {
        &self.validation_errors
    }

    /// Attach validation results; the only way `valid` changes
    pub(crate) fn into_validated(mut self, errors: Vec<String>) -> Self {
        self.character_count = self.content.chars().count();
        self.valid = errors.is_empty();
        self.validation_errors = errors;
        self
    }
}

/// Outcome of one publish attempt to one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub success: bool,
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error kind (see `PlatformError::kind`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Some targets of an aggregate publish did not report a URL
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

impl PublishResult {
    pub fn success(platform: Platform, url: Option<String>, metadata: Map<String, Value>) -> Self {
        Self {
            success: true,
            platform,
            url,
            error: None,
            error_kind: None,
            metadata,
            published_at: Some(Utc::now()),
            partial: false,
        }
    }

    pub fn failure(platform: Platform, error: &crate::error::PlatformError) -> Self {
        Self {
            success: false,
            platform,
            url: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            metadata: Map::new(),
            published_at: None,
            partial: false,
        }
    }
}

/// Aggregate of one post fanned out to several platforms
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub slug: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total_platforms: usize,
    pub successful_platforms: usize,
    pub failed_platforms: usize,
    pub results: Vec<PublishResult>,
    pub summary: String,
}

impl PublishReport {
    pub fn from_results(
        slug: impl Into<String>,
        started_at: DateTime<Utc>,
        results: Vec<PublishResult>,
    ) -> Self {
        let slug = slug.into();
        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;

        let mut summary = format!(
            "Published '{}' to {}/{} platform(s)",
            slug,
            successful,
            results.len()
        );
        if failed > 0 {
            let names: Vec<&str> = results
                .iter()
                .filter(|r| !r.success)
                .map(|r| r.platform.as_str())
                .collect();
            summary.push_str(&format!("; failed: {}", names.join(", ")));
        }
        let partial: Vec<&str> = results
            .iter()
            .filter(|r| r.partial)
            .map(|r| r.platform.as_str())
            .collect();
        if !partial.is_empty() {
            summary.push_str(&format!("; partial: {}", partial.join(", ")));
        }

        Self {
            slug,
            started_at,
            completed_at: Utc::now(),
            total_platforms: results.len(),
            successful_platforms: successful,
            failed_platforms: failed,
            results,
            summary,
        }
    }

    /// True when every platform succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed_platforms == 0
    }
}
