//! Estimated reading time

use super::post::ContentBlock;
use super::richtext::as_text;

/// Average reading speed used when none is configured
pub const DEFAULT_WORDS_PER_MINUTE: usize = 200;

/// Count words separated by single spaces.
///
/// Empty tokens (from empty text or repeated spaces) are not words.
pub fn count_words(text: &str) -> usize {
    text.split(' ').filter(|word| !word.is_empty()).count()
}

/// Total words across headings and flattened bodies
pub fn total_words(content: &[ContentBlock]) -> usize {
    content
        .iter()
        .map(|block| {
            let heading = count_words(block.heading.as_deref().unwrap_or(""));
            let body = count_words(&as_text(&block.body));
            heading + body
        })
        .sum()
}

/// Reading time in whole minutes, rounded up
pub fn reading_time(content: &[ContentBlock], words_per_minute: usize) -> usize {
    total_words(content).div_ceil(words_per_minute.max(1))
}
