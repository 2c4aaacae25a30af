/// Pack text into chunks of at most `max_length` characters
///
/// Paragraphs (blank-line separated) are packed greedily. A paragraph longer
/// than `max_length` is broken on sentence ends (`". "` or a newline), and a
/// sentence that still does not fit is broken between words. Only a single
/// word longer than `max_length` is ever cut.
pub fn split_into_threads(content: &str, max_length: usize) -> Vec<String> {
    let mut packer = Packer::new(max_length.max(1));

    for paragraph in content.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if char_len(paragraph) <= packer.max_length {
            packer.push(paragraph, "\n\n");
            continue;
        }

        let mut separator = "\n\n";
        for sentence in split_sentences(paragraph) {
            if char_len(&sentence) <= packer.max_length {
                packer.push(&sentence, separator);
            } else {
                for piece in split_words(&sentence, packer.max_length) {
                    packer.push(&piece, separator);
                    separator = " ";
                }
            }
            separator = " ";
        }
    }

    packer.finish()
}

struct Packer {
    max_length: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
}

impl Packer {
    fn new(max_length: usize) -> Self {
        Self {
            max_length,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
        }
    }

    fn push(&mut self, piece: &str, separator: &str) {
        let piece_len = char_len(piece);
        if self.current.is_empty() {
            self.current.push_str(piece);
            self.current_len = piece_len;
            return;
        }

        let joined_len = self.current_len + char_len(separator) + piece_len;
        if joined_len <= self.max_length {
            self.current.push_str(separator);
            self.current.push_str(piece);
            self.current_len = joined_len;
        } else {
            self.chunks.push(std::mem::take(&mut self.current));
            self.current.push_str(piece);
            self.current_len = piece_len;
        }
    }

    fn finish(mut self) -> Vec<String> {
        if !self.current.is_empty() {
            self.chunks.push(self.current);
        }
        self.chunks
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Sentences end at `". "` (the period stays) or at a newline
fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = paragraph.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\n' => {
                sentences.push(std::mem::take(&mut current));
            }
            '.' if chars.peek() == Some(&' ') => {
                current.push('.');
                chars.next();
                sentences.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    sentences.push(current);

    sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Greedy word packing for a sentence that does not fit in one chunk
fn split_words(sentence: &str, max_length: usize) -> Vec<String> {
    let mut packer = Packer::new(max_length);
    for word in sentence.split_whitespace() {
        if char_len(word) <= max_length {
            packer.push(word, " ");
        } else {
            // A single word longer than a chunk has to be cut
            let chars: Vec<char> = word.chars().collect();
            for part in chars.chunks(max_length) {
                packer.push(&part.iter().collect::<String>(), " ");
            }
        }
    }
    packer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<&str> {
        text.split_whitespace().collect()
    }

    fn long_paragraph() -> String {
        let sentences = [
            "Rate limiting protects both the platform and your account standing.",
            "A sliding window keeps bursts from piling up at window edges.",
            "Retries with exponential backoff give flaky networks time to recover.",
            "Authentication failures are never retried because they cannot fix themselves.",
            "Every publish attempt is recorded so that reruns skip finished platforms.",
            "Threads are posted one reply at a time and stop at the first failure.",
            "Dry runs exercise the whole pipeline without touching any remote API.",
        ];
        sentences.join(" ")
    }

    #[test]
    fn test_short_content_single_chunk() {
        assert_eq!(split_into_threads("Hello world.", 280), vec!["Hello world."]);
    }

    #[test]
    fn test_empty_content_no_chunks() {
        assert!(split_into_threads("  \n\n  ", 280).is_empty());
    }

    #[test]
    fn test_paragraphs_packed_greedily() {
        let content = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = split_into_threads(content, 40);
        assert_eq!(
            chunks,
            vec!["First paragraph.\n\nSecond paragraph.", "Third paragraph."]
        );
    }

    #[test]
    fn test_long_paragraph_respects_limit_and_reconstructs() {
        let paragraph = long_paragraph();
        assert!(paragraph.chars().count() > 280);

        let chunks = split_into_threads(&paragraph, 280);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 280, "chunk too long: {}", chunk);
        }

        let rebuilt = chunks.join(" ");
        assert_eq!(words(&rebuilt), words(&paragraph));
    }

    #[test]
    fn test_never_breaks_inside_a_word() {
        let paragraph = long_paragraph();
        let original_words = words(&paragraph);
        for max in [50, 80, 120, 280] {
            for chunk in split_into_threads(&paragraph, max) {
                for word in chunk.split_whitespace() {
                    assert!(original_words.contains(&word), "broken word {:?} at max {}", word, max);
                }
            }
        }
    }

    #[test]
    fn test_sentence_longer_than_limit_split_on_words() {
        let sentence = "one two three four five six seven eight nine ten";
        let chunks = split_into_threads(sentence, 15);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 15);
        }
        assert_eq!(words(&chunks.join(" ")), words(sentence));
    }

    #[test]
    fn test_newline_is_a_sentence_boundary() {
        let content = format!("{}\n{}", "a".repeat(10), "b".repeat(10));
        let chunks = split_into_threads(&content, 15);
        assert_eq!(chunks, vec!["a".repeat(10), "b".repeat(10)]);
    }

    #[test]
    fn test_oversized_word_is_cut() {
        let chunks = split_into_threads(&"x".repeat(25), 10);
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }
}
