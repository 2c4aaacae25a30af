use regex::Regex;
use std::sync::LazyLock;

static FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)(```|~~~).*?(```|~~~)").expect("valid regex"));
static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]*)`").expect("valid regex"));
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[#*_~>|]").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));

/// Fraction of `max_length` a sentence boundary must pass to be used
const SENTENCE_BOUNDARY_RATIO: f64 = 0.7;
const ELLIPSIS: &str = "...";

/// Strip markdown syntax inside one block of text, without collapsing whitespace
fn strip_inline(text: &str) -> String {
    let text = IMAGE.replace_all(text, "$1");
    let text = LINK.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = HTML_TAG.replace_all(&text, "");
    PUNCTUATION.replace_all(&text, "").into_owned()
}

/// Markdown to a single line of plain prose
///
/// Fenced code blocks are dropped entirely; inline code keeps its text.
pub fn strip_markdown(markdown: &str) -> String {
    let without_code = FENCED_CODE.replace_all(markdown, " ");
    let plain = strip_inline(&without_code);
    WHITESPACE.replace_all(&plain, " ").trim().to_string()
}

/// Plain-text paragraphs of a markdown body, code blocks removed
pub(crate) fn plain_paragraphs(markdown: &str) -> Vec<String> {
    let without_code = FENCED_CODE.replace_all(markdown, "\n\n");
    BLANK_LINES
        .split(&without_code)
        .map(|block| {
            let plain = strip_inline(block);
            WHITESPACE.replace_all(&plain, " ").trim().to_string()
        })
        .filter(|p| !p.is_empty())
        .collect()
}

/// Plain-text summary of at most `max_length` characters
///
/// Cuts at the last sentence end when it falls past 70% of `max_length`;
/// otherwise cuts at the last word boundary and appends `...`.
pub fn create_excerpt(content: &str, max_length: usize) -> String {
    let plain = strip_markdown(content);
    let chars: Vec<char> = plain.chars().collect();

    if chars.len() <= max_length {
        return plain;
    }

    let threshold = max_length as f64 * SENTENCE_BOUNDARY_RATIO;
    let sentence_end = (0..max_length)
        .rev()
        .find(|&i| {
            matches!(chars[i], '.' | '!' | '?')
                && chars.get(i + 1).map_or(true, |c| c.is_whitespace())
        })
        .map(|i| i + 1);

    if let Some(end) = sentence_end {
        if end as f64 > threshold {
            return chars[..end].iter().collect::<String>().trim_end().to_string();
        }
    }

    if max_length <= ELLIPSIS.len() {
        return chars[..max_length].iter().collect();
    }

    let budget = max_length - ELLIPSIS.len();
    // Back off to the last space so no word is cut in half
    let cut = if chars[budget].is_whitespace() {
        budget
    } else {
        (0..budget)
            .rev()
            .find(|&i| chars[i].is_whitespace())
            .unwrap_or(budget)
    };

    let mut excerpt: String = chars[..cut].iter().collect();
    excerpt.truncate(excerpt.trim_end().len());
    excerpt.push_str(ELLIPSIS);
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_content_returned_unchanged() {
        assert_eq!(create_excerpt("Hello **world**.", 100), "Hello world.");
    }

    #[test]
    fn test_inline_code_marker_stripped_and_cut_at_sentence() {
        let excerpt = create_excerpt(
            "Some code: `x=1` and more text. Another full sentence.",
            40,
        );
        assert_eq!(excerpt, "Some code: x=1 and more text.");
        assert!(!excerpt.contains('`'));
    }

    #[test]
    fn test_code_blocks_removed() {
        let markdown = "Intro line.\n\n```rust\nfn main() {}\n```\n\nOutro line.";
        assert_eq!(create_excerpt(markdown, 200), "Intro line. Outro line.");
    }

    #[test]
    fn test_links_and_headings_flattened() {
        let markdown = "## Heading\n\nRead [the docs](https://docs.rs) and ![logo](x.png) now.";
        assert_eq!(
            create_excerpt(markdown, 200),
            "Heading Read the docs and logo now."
        );
    }

    #[test]
    fn test_hard_truncation_never_splits_words() {
        let text = "Supercalifragilistic expialidocious words keep going without any stops";
        let excerpt = create_excerpt(text, 30);
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.chars().count() <= 30);
        let without_ellipsis = excerpt.trim_end_matches("...");
        for word in without_ellipsis.split_whitespace() {
            assert!(text.split_whitespace().any(|w| w == word), "split word: {}", word);
        }
    }

    #[test]
    fn test_early_sentence_boundary_ignored() {
        // The only sentence end is at 4 of 30 chars, well under 70%
        let excerpt = create_excerpt("Hi. this continues for quite a long while without a stop", 30);
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.starts_with("Hi. this"));
    }

    #[test]
    fn test_decimal_point_is_not_a_sentence_end() {
        let excerpt = create_excerpt("Version 3.14 brings many improvements to everything here", 20);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        let text = "é".repeat(50);
        let excerpt = create_excerpt(&text, 10);
        assert!(excerpt.chars().count() <= 10);
    }

    #[test]
    fn test_plain_paragraphs_splits_blocks() {
        let markdown = "# Title\n\nFirst *para*\nwraps.\n\n```\ncode\n```\n\nSecond para.";
        assert_eq!(
            plain_paragraphs(markdown),
            vec!["Title", "First para wraps.", "Second para."]
        );
    }
}
