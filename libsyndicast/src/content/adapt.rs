use super::{create_excerpt, format_hashtags, plain_paragraphs, validate_content, TWEET_LENGTH};
use crate::types::{Platform, PlatformContent, PostMetadata};

/// Excerpt length for article platforms' description fields
const EXCERPT_LENGTH: usize = 160;
/// Body excerpt length for the LinkedIn post
const LINKEDIN_EXCERPT_LENGTH: usize = 1_200;
/// Source text budget for a thread derivative (about eight posts)
const THREAD_SOURCE_BUDGET: usize = TWEET_LENGTH * 8;

/// Derive a validated, platform-shaped rendering of a post
///
/// Article platforms get the markdown body; social platforms get a plain
/// text derivative. Tags are already formatted for the platform.
pub fn adapt(meta: &PostMetadata, body: &str, platform: Platform) -> PlatformContent {
    let excerpt = if meta.description.trim().is_empty() {
        create_excerpt(body, EXCERPT_LENGTH)
    } else {
        meta.description.trim().to_string()
    };

    let text = match platform {
        Platform::DevTo | Platform::Hashnode => body.trim().to_string(),
        Platform::Medium => format!(
            "{}\n\n---\n\n*Originally published at [{}]({}).*",
            body.trim(),
            meta.canonical_url,
            meta.canonical_url
        ),
        Platform::Newsletter => format!(
            "{}\n\n---\n\nRead this post on the web: {}",
            body.trim(),
            meta.canonical_url
        ),
        Platform::Twitter | Platform::Typefully => thread_source(meta, body),
        Platform::LinkedIn => linkedin_post(meta, body),
    };

    let mut tags = format_hashtags(&meta.tags, platform);
    if matches!(platform, Platform::DevTo | Platform::Hashnode) {
        // Both platforms key tags by lowercase slug
        tags = tags.into_iter().map(|t| t.to_lowercase()).collect();
    }

    let content = PlatformContent::new(platform, &meta.slug, &meta.title, text, &meta.canonical_url)
        .with_tags(tags)
        .with_excerpt(excerpt)
        .with_cover_image(meta.cover_image.clone());

    validate_content(content)
}

/// Title, description and leading paragraphs as plain text
fn thread_source(meta: &PostMetadata, body: &str) -> String {
    let mut parts = vec![meta.title.trim().to_string()];
    if !meta.description.trim().is_empty() {
        parts.push(meta.description.trim().to_string());
    }

    let mut used: usize = parts.iter().map(|p| p.chars().count() + 2).sum();
    for paragraph in plain_paragraphs(body) {
        let length = paragraph.chars().count() + 2;
        if used + length > THREAD_SOURCE_BUDGET {
            break;
        }
        used += length;
        parts.push(paragraph);
    }

    parts.join("\n\n")
}

fn linkedin_post(meta: &PostMetadata, body: &str) -> String {
    let hashtags = format_hashtags(&meta.tags, Platform::LinkedIn).join(" ");
    let mut post = format!(
        "{}\n\n{}\n\nRead the full post: {}",
        meta.title.trim(),
        create_excerpt(body, LINKEDIN_EXCERPT_LENGTH),
        meta.canonical_url
    );
    if !hashtags.is_empty() {
        post.push_str("\n\n");
        post.push_str(&hashtags);
    }
    post
}
