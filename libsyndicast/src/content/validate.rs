use super::platform_limits;
use crate::types::PlatformContent;

/// Check content against its platform's limits
///
/// Never fails and never edits text; problems are reported through
/// `is_valid()` and `validation_errors()` on the returned content.
pub fn validate_content(content: PlatformContent) -> PlatformContent {
    let limits = platform_limits(content.platform);
    let mut errors = Vec::new();

    if content.title.trim().is_empty() {
        errors.push("Title is required".to_string());
    }
    if content.content.trim().is_empty() {
        errors.push("Content is required".to_string());
    }
    if content.canonical_url.trim().is_empty() {
        errors.push("Canonical URL is required".to_string());
    }

    if let Some(max) = limits.max_title_length {
        let length = content.title.chars().count();
        if length > max {
            errors.push(format!(
                "Title too long for {}: {} characters (max {})",
                content.platform.display_name(),
                length,
                max
            ));
        }
    }

    if let Some(max) = limits.max_body_length {
        let length = content.content.chars().count();
        if length > max {
            errors.push(format!(
                "Content too long for {}: {} characters (max {})",
                content.platform.display_name(),
                length,
                max
            ));
        }
    }

    if content.tags.len() > limits.max_tags {
        errors.push(format!(
            "Too many tags for {}: {} (max {})",
            content.platform.display_name(),
            content.tags.len(),
            limits.max_tags
        ));
    }

    content.into_validated(errors)
}
