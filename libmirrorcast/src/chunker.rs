//! Splitting over-length text into numbered thread chunks

/// Destination post length limit, in characters
pub const MAX_POST_LENGTH: usize = 300;

/// Characters reserved for the `" [i/n]"` position marker
pub const MARKER_RESERVE: usize = 6;

/// Length of `text` as the chunker counts it
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `text` into chunks of at most `max_len - reserve` characters, each
/// suffixed with `" [i/n]"`.
///
/// Words are separated by single spaces, so line breaks survive inside a
/// chunk. Runs of spaces and leading or trailing spaces produce no words. A word is never split: one longer than the budget becomes its own
/// oversized chunk. Text that already fits in `max_len` comes back whole as
/// `[1/1]`. Always returns at least one chunk.
pub fn split_into_chunks(text: &str, max_len: usize, reserve: usize) -> Vec<String> {
    if char_len(text) <= max_len {
        return vec![format!("{} [1/1]", text)];
    }

    let budget = max_len.saturating_sub(reserve);

    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for word in text.split(' ').filter(|w| !w.is_empty()) {
        let word_len = char_len(word);
        if !current.is_empty() && current_len + word_len + 1 > budget {
            chunks.push(current.join(" "));
            current.clear();
            current_len = 0;
        }
        current.push(word);
        current_len += word_len + 1;
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current.join(" "));
    }

    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| format!("{} [{}/{}]", chunk, i + 1, total))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_marker(chunk: &str) -> &str {
        let idx = chunk.rfind(" [").expect("chunk carries a marker");
        &chunk[..idx]
    }

    fn normalize_ws(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| format!("word{}", i % 97))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_short_text_is_one_chunk_with_marker() {
        let chunks = split_into_chunks("Hello world", MAX_POST_LENGTH, MARKER_RESERVE);
        assert_eq!(chunks, vec!["Hello world [1/1]".to_string()]);
    }

    #[test]
    fn test_text_at_limit_is_unchanged_apart_from_marker() {
        let text = "a".repeat(MAX_POST_LENGTH);
        let chunks = split_into_chunks(&text, MAX_POST_LENGTH, MARKER_RESERVE);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], format!("{} [1/1]", text));
    }

    #[test]
    fn test_spaced_text_between_budget_and_limit_stays_whole() {
        // 298 characters: over the packing budget, but fits in one post
        let text = format!("{} {}", "a".repeat(149), "b".repeat(148));
        let chunks = split_into_chunks(&text, MAX_POST_LENGTH, MARKER_RESERVE);
        assert_eq!(chunks, vec![format!("{} [1/1]", text)]);
    }

    #[test]
    fn test_long_text_round_trips_through_chunks() {
        let text = words(200);
        let chunks = split_into_chunks(&text, MAX_POST_LENGTH, MARKER_RESERVE);
        assert!(chunks.len() > 1);

        let rejoined = chunks.iter().map(|c| strip_marker(c)).collect::<Vec<_>>().join(" ");
        assert_eq!(normalize_ws(&rejoined), normalize_ws(&text));
    }

    #[test]
    fn test_chunks_respect_budget_and_limit() {
        let text = words(300);
        let chunks = split_into_chunks(&text, MAX_POST_LENGTH, MARKER_RESERVE);
        for chunk in &chunks {
            assert!(char_len(strip_marker(chunk)) <= MAX_POST_LENGTH - MARKER_RESERVE);
            assert!(char_len(chunk) <= MAX_POST_LENGTH, "chunk too long: {}", chunk);
        }
    }

    #[test]
    fn test_markers_are_numbered_in_order() {
        let chunks = split_into_chunks(&words(150), MAX_POST_LENGTH, MARKER_RESERVE);
        let n = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(chunk.ends_with(&format!(" [{}/{}]", i + 1, n)));
        }
    }

    #[test]
    fn test_words_are_never_split() {
        let text = words(300);
        let originals: std::collections::HashSet<&str> = text.split(' ').collect();
        for chunk in split_into_chunks(&text, MAX_POST_LENGTH, MARKER_RESERVE) {
            for word in strip_marker(&chunk).split(' ') {
                assert!(originals.contains(word), "split word: {}", word);
            }
        }
    }

    #[test]
    fn test_oversized_word_becomes_its_own_chunk() {
        let giant = "x".repeat(400);
        let text = format!("before {} after", giant);
        let chunks = split_into_chunks(&text, MAX_POST_LENGTH, MARKER_RESERVE);
        assert_eq!(
            chunks,
            vec![
                "before [1/3]".to_string(),
                format!("{} [2/3]", giant),
                "after [3/3]".to_string(),
            ]
        );
    }

    #[test]
    fn test_leading_oversized_word_does_not_emit_empty_chunk() {
        let giant = "y".repeat(350);
        let chunks = split_into_chunks(&giant, MAX_POST_LENGTH, MARKER_RESERVE);
        assert_eq!(chunks, vec![format!("{} [1/1]", giant)]);
    }

    #[test]
    fn test_trailing_space_leaves_no_gap_before_marker() {
        let text = format!("{} ", words(60));
        let chunks = split_into_chunks(&text, MAX_POST_LENGTH, MARKER_RESERVE);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.contains("  ["), "gap before marker: {:?}", chunk);
            assert!(!strip_marker(chunk).starts_with(' '));
        }
    }

    #[test]
    fn test_blank_text_over_limit_still_yields_a_chunk() {
        let text = " ".repeat(MAX_POST_LENGTH + 1);
        let chunks = split_into_chunks(&text, MAX_POST_LENGTH, MARKER_RESERVE);
        assert_eq!(chunks, vec![" [1/1]".to_string()]);
    }

    #[test]
    fn test_newlines_are_kept_inside_chunks() {
        let text = format!("{}\n\nsecond paragraph", words(10));
        let chunks = split_into_chunks(&text, MAX_POST_LENGTH, MARKER_RESERVE);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("\n\nsecond paragraph"));
    }

    #[test]
    fn test_lengths_count_characters_not_bytes() {
        // 150 two-char words of multi-byte characters: 449 chars, well over 600 bytes
        let text = vec!["éé"; 150].join(" ");
        let chunks = split_into_chunks(&text, MAX_POST_LENGTH, MARKER_RESERVE);
        assert_eq!(chunks.len(), 2);
        assert!(char_len(strip_marker(&chunks[0])) <= MAX_POST_LENGTH - MARKER_RESERVE);
    }
}
