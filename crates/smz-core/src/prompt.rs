//! Summary prompt construction and map-reduce chunking.

use smz_models::{Language, SummaryLength};

/// Rough token estimate: four characters per token.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Build the single-pass summary prompt.
///
/// A numeric character budget is a hard limit, not a suggestion.
pub fn build_summary_prompt(
    content: &str,
    title: &str,
    url: &str,
    length: SummaryLength,
    language: &Language,
    custom_prompt: Option<&str>,
) -> String {
    let budget = length.target_characters();
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Summarize the following content in {}. \
         The summary must stay under {} characters; treat that as a hard limit.\n",
        language.label, budget
    ));
    if let Some(custom) = custom_prompt {
        prompt.push_str(custom.trim());
        prompt.push('\n');
    }
    prompt.push_str(&format!("\nTitle: {title}\nSource: {url}\n\n---\n{content}"));
    prompt
}

/// Per-chunk notes prompt for the map phase.
pub fn build_chunk_notes_prompt(
    chunk: &str,
    index: usize,
    total: usize,
    language: &Language,
) -> String {
    format!(
        "This is part {part} of {total} of a longer document. \
         Write concise factual notes (in {lang}) capturing every substantive \
         point in this part. Notes only, no preamble.\n\n---\n{chunk}",
        part = index + 1,
        total = total,
        lang = language.label,
    )
}

/// Final merge prompt for the reduce phase.
pub fn build_merge_prompt(
    notes: &[String],
    title: &str,
    url: &str,
    length: SummaryLength,
    language: &Language,
    custom_prompt: Option<&str>,
) -> String {
    let joined = notes
        .iter()
        .enumerate()
        .map(|(i, n)| format!("## Notes part {}\n{}", i + 1, n))
        .collect::<Vec<_>>()
        .join("\n\n");
    build_summary_prompt(&joined, title, url, length, language, custom_prompt)
}

/// Split content into chunks of at most `chunk_chars`, preferring paragraph
/// boundaries and never splitting inside a word.
pub fn split_into_chunks(content: &str, chunk_chars: usize) -> Vec<String> {
    if content.chars().count() <= chunk_chars {
        return vec![content.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in content.split("\n\n") {
        let para_len = paragraph.chars().count();
        let current_len = current.chars().count();

        if current_len + para_len + 2 > chunk_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if para_len > chunk_chars {
            // A single oversized paragraph splits on word boundaries.
            let mut piece = String::new();
            for word in paragraph.split_whitespace() {
                if piece.chars().count() + word.chars().count() + 1 > chunk_chars
                    && !piece.is_empty()
                {
                    chunks.push(std::mem::take(&mut piece));
                }
                if !piece.is_empty() {
                    piece.push(' ');
                }
                piece.push_str(word);
            }
            if !piece.is_empty() {
                current = piece;
            }
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use smz_models::resolve_language;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_prompt_carries_hard_limit_and_language() {
        let lang = resolve_language("de");
        let prompt = build_summary_prompt(
            "body",
            "Title",
            "https://a/",
            SummaryLength::Short,
            &lang,
            None,
        );
        assert!(prompt.contains("German"));
        assert!(prompt.contains("under 600 characters"));
        assert!(prompt.contains("hard limit"));
        assert!(prompt.contains("body"));
    }

    #[test]
    fn test_custom_prompt_included() {
        let lang = resolve_language("en");
        let prompt = build_summary_prompt(
            "body",
            "T",
            "https://a/",
            SummaryLength::Medium,
            &lang,
            Some("Focus on the numbers."),
        );
        assert!(prompt.contains("Focus on the numbers."));
    }

    #[test]
    fn test_split_short_content_single_chunk() {
        let chunks = split_into_chunks("short content", 1000);
        assert_eq!(chunks, vec!["short content".to_string()]);
    }

    #[test]
    fn test_split_on_paragraphs() {
        let content = format!("{}\n\n{}\n\n{}", "a".repeat(40), "b".repeat(40), "c".repeat(40));
        let chunks = split_into_chunks(&content, 100);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].contains("aaa"));
        assert!(chunks[0].contains("bbb"));
        assert!(chunks[1].contains("ccc"));
    }

    #[test]
    fn test_split_oversized_paragraph_on_words() {
        let content = "word ".repeat(100);
        let chunks = split_into_chunks(content.trim(), 50);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50);
            assert!(!chunk.starts_with(' '));
        }
    }

    #[test]
    fn test_chunks_cover_all_content() {
        let content = (0..50)
            .map(|i| format!("paragraph number {i} with some words"))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_into_chunks(&content, 200);
        let rejoined = chunks.join("\n\n");
        for i in 0..50 {
            let expected = format!("paragraph number {i} with some words");
            assert!(rejoined.contains(&expected), "paragraph {i} missing");
        }
    }
}
