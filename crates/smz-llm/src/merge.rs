//! Streaming delta merge.
//!
//! Some vendors replay the accumulated text and extend it instead of sending
//! a pure delta. The merge rule: when one side is a prefix of the other,
//! keep the longer; otherwise append. This exact rule is load-bearing for
//! progressive rendering downstream.

/// Merge the next streaming chunk into the accumulated text.
pub fn merge_streaming_chunk(previous: &str, next: &str) -> String {
    if next.starts_with(previous) {
        // The model replayed and extended.
        return next.to_string();
    }
    if previous.starts_with(next) {
        // Pure replay (or shorter); nothing new.
        return previous.to_string();
    }
    let mut merged = String::with_capacity(previous.len() + next.len());
    merged.push_str(previous);
    merged.push_str(next);
    merged
}

/// Consumer-visible form: whitespace collapsed, ends trimmed.
///
/// Server state retains the raw concatenation; only the observable form is
/// cleaned.
pub fn clean_visible_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_delta_appends() {
        assert_eq!(merge_streaming_chunk("Hello", " world"), "Hello world");
    }

    #[test]
    fn test_prefix_extension_takes_longer() {
        assert_eq!(merge_streaming_chunk("Hello", "Hello world"), "Hello world");
    }

    #[test]
    fn test_replay_of_shorter_keeps_previous() {
        assert_eq!(merge_streaming_chunk("Hello world", "Hello"), "Hello world");
    }

    #[test]
    fn test_idempotent_on_identical_repeat() {
        let s = "exactly the same";
        assert_eq!(merge_streaming_chunk(s, s), s);
    }

    #[test]
    fn test_empty_sides() {
        assert_eq!(merge_streaming_chunk("", "abc"), "abc");
        assert_eq!(merge_streaming_chunk("abc", ""), "abc");
    }

    #[test]
    fn test_clean_visible_text() {
        assert_eq!(clean_visible_text("  a\n\nb\t c  "), "a b c");
    }
}
