//! Output-language resolution.
//!
//! Normalizes free-form language input ("de", "German", "portuguese") to a
//! `{tag, label}` pair. Unrecognized input keeps its sanitized form as the
//! label so it can be passed straight to the model.

use serde::{Deserialize, Serialize};

/// A resolved output language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// BCP-47-ish tag when recognized.
    pub tag: Option<String>,
    /// Human-readable label handed to the prompt.
    pub label: String,
}

const KNOWN: &[(&str, &str, &str)] = &[
    // tag, english name, native/alt spellings are matched case-insensitively
    ("en", "English", ""),
    ("es", "Spanish", "español"),
    ("de", "German", "deutsch"),
    ("fr", "French", "français"),
    ("it", "Italian", "italiano"),
    ("pt", "Portuguese", "português"),
    ("nl", "Dutch", "nederlands"),
    ("pl", "Polish", "polski"),
    ("ru", "Russian", ""),
    ("uk", "Ukrainian", ""),
    ("tr", "Turkish", ""),
    ("ja", "Japanese", ""),
    ("ko", "Korean", ""),
    ("zh", "Chinese", "mandarin"),
    ("ar", "Arabic", ""),
    ("hi", "Hindi", ""),
    ("sv", "Swedish", "svenska"),
    ("no", "Norwegian", "norsk"),
    ("da", "Danish", "dansk"),
    ("fi", "Finnish", "suomi"),
    ("cs", "Czech", ""),
    ("el", "Greek", ""),
    ("he", "Hebrew", ""),
    ("id", "Indonesian", ""),
    ("th", "Thai", ""),
    ("vi", "Vietnamese", ""),
];

/// Strip control characters and trim the raw input.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Resolve free-form language input to `{tag, label}`.
///
/// Matching is case-insensitive against the tag, the English name, and known
/// alternate spellings. A region suffix on a tag (`en-GB`) matches its base.
pub fn resolve_language(raw: &str) -> Language {
    let cleaned = sanitize(raw);
    let lowered = cleaned.to_lowercase();
    let base = lowered.split(['-', '_']).next().unwrap_or(&lowered);

    for (tag, name, alt) in KNOWN {
        if lowered == *tag
            || base == *tag
            || lowered == name.to_lowercase()
            || (!alt.is_empty() && lowered == *alt)
        {
            return Language {
                tag: Some((*tag).to_string()),
                label: (*name).to_string(),
            };
        }
    }

    Language {
        tag: None,
        label: cleaned,
    }
}
