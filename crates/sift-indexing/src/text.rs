//! Char-offset helpers.
//!
//! Offsets in chunks and index records count Unicode scalars, not bytes,
//! so that positions survive the trip through JSON and back for any
//! language. These helpers are the single place that converts between
//! the two.

/// Number of chars in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `char_idx`-th char, clamped to `s.len()`.
pub fn byte_of_char(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(b, _)| b)
        .unwrap_or(s.len())
}

/// Slice by char offsets, clamped to the string bounds.
pub fn char_slice(s: &str, char_start: usize, char_end: usize) -> &str {
    if char_end <= char_start {
        return "";
    }
    let start = byte_of_char(s, char_start);
    let end = byte_of_char(s, char_end);
    &s[start..end]
}

/// Inclusive whitespace-split word offsets for a char span.
/// `word_start` counts the words strictly before the span; `word_end`
/// is the index of the last word at or before the span's end.
pub fn word_span(content: &str, byte_start: usize, byte_end: usize) -> (usize, usize) {
    let words_before = content[..byte_start].split_whitespace().count();
    let words_through = content[..byte_end].split_whitespace().count();
    (words_before, words_through.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_slice_ascii() {
        assert_eq!(char_slice("hello world", 6, 11), "world");
    }

    #[test]
    fn test_char_slice_multibyte() {
        let s = "안녕하세요 world";
        assert_eq!(char_len(s), 11);
        assert_eq!(char_slice(s, 0, 5), "안녕하세요");
        assert_eq!(char_slice(s, 6, 11), "world");
    }

    #[test]
    fn test_char_slice_clamps() {
        assert_eq!(char_slice("abc", 1, 100), "bc");
        assert_eq!(char_slice("abc", 5, 10), "");
        assert_eq!(char_slice("abc", 2, 1), "");
    }

    #[test]
    fn test_word_span() {
        let content = "one two three four";
        // span covering "two three"
        let (start, end) = word_span(content, 4, 13);
        assert_eq!(start, 1);
        assert_eq!(end, 2);
    }

    #[test]
    fn test_word_span_at_origin() {
        let content = "one two";
        let (start, end) = word_span(content, 0, 3);
        assert_eq!(start, 0);
        assert_eq!(end, 0);
    }
}
