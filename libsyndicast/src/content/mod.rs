//! Platform-shaped content: excerpts, hashtags, threads and validation
//!
//! Everything here is pure. Formatting never fails and validation only
//! reports problems; neither touches the network.

mod adapt;
mod excerpt;
mod thread;
mod validate;

pub use adapt::adapt;
pub use excerpt::{create_excerpt, strip_markdown};
pub use thread::split_into_threads;
pub use validate::validate_content;

pub(crate) use excerpt::plain_paragraphs;

use regex::Regex;
use std::sync::LazyLock;

use crate::types::Platform;

/// Hard limits a platform enforces on one piece of content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformLimits {
    pub max_title_length: Option<usize>,
    pub max_body_length: Option<usize>,
    pub max_tags: usize,
    /// Tags are rendered as `#tag`
    pub hashtag_prefix: bool,
}

/// Characters per tweet
pub const TWEET_LENGTH: usize = 280;
/// Longest thread we will post
pub const MAX_THREAD_LENGTH: usize = 25;

pub const PLATFORM_LIMITS: [(Platform, PlatformLimits); 7] = [
    (
        Platform::DevTo,
        PlatformLimits {
            max_title_length: Some(128),
            max_body_length: None,
            max_tags: 4,
            hashtag_prefix: false,
        },
    ),
    (
        Platform::Medium,
        PlatformLimits {
            max_title_length: Some(100),
            max_body_length: None,
            max_tags: 5,
            hashtag_prefix: false,
        },
    ),
    (
        Platform::Hashnode,
        PlatformLimits {
            max_title_length: Some(250),
            max_body_length: None,
            max_tags: 5,
            hashtag_prefix: false,
        },
    ),
    (
        Platform::Twitter,
        PlatformLimits {
            max_title_length: None,
            max_body_length: Some(TWEET_LENGTH * MAX_THREAD_LENGTH),
            max_tags: 5,
            hashtag_prefix: true,
        },
    ),
    (
        Platform::LinkedIn,
        PlatformLimits {
            max_title_length: Some(200),
            max_body_length: Some(3_000),
            max_tags: 10,
            hashtag_prefix: true,
        },
    ),
    (
        Platform::Typefully,
        PlatformLimits {
            max_title_length: None,
            max_body_length: Some(TWEET_LENGTH * MAX_THREAD_LENGTH),
            max_tags: 5,
            hashtag_prefix: true,
        },
    ),
    (
        Platform::Newsletter,
        PlatformLimits {
            max_title_length: Some(150),
            max_body_length: None,
            max_tags: 10,
            hashtag_prefix: false,
        },
    ),
];

/// Look up a platform's row in [`PLATFORM_LIMITS`]
pub fn platform_limits(platform: Platform) -> PlatformLimits {
    PLATFORM_LIMITS
        .iter()
        .find(|(p, _)| *p == platform)
        .map(|(_, limits)| *limits)
        .unwrap_or(PlatformLimits {
            max_title_length: None,
            max_body_length: None,
            max_tags: 0,
            hashtag_prefix: false,
        })
}

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").expect("valid regex"));

/// Normalise tags for a platform
///
/// Non-word characters are removed, empty and duplicate tags dropped, the
/// platform's tag-count limit applied, and `#` prefixed on Twitter and
/// LinkedIn style platforms.
pub fn format_hashtags(tags: &[String], platform: Platform) -> Vec<String> {
    let limits = platform_limits(platform);
    let mut seen = std::collections::HashSet::new();

    tags.iter()
        .map(|tag| NON_WORD.replace_all(tag, "").into_owned())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .take(limits.max_tags)
        .map(|tag| {
            if limits.hashtag_prefix {
                format!("#{}", tag)
            } else {
                tag
            }
        })
        .collect()
}
