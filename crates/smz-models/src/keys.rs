//! Cache-key fingerprints.
//!
//! Every key is a SHA-256 digest over a canonical `field=value` list with a
//! fixed field order, rendered as lowercase hex. `FORMAT_VERSION` participates
//! in every key so a prompt-format change invalidates all prior entries.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bumped whenever prompt shapes or extraction normalization change.
pub const FORMAT_VERSION: u32 = 4;

/// Extraction settings that participate in the content key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtractSettingsKey {
    pub firecrawl: String,
    pub markdown: String,
    pub max_characters: Option<usize>,
}

/// Slide settings that participate in the slides key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SlideSettingsKey {
    pub scene_threshold: Option<f64>,
    pub max_slides: u32,
    pub min_slide_duration: f64,
    pub ocr: bool,
}

fn fingerprint(version: u32, fields: &[(&str, String)]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("v={}\n", version).as_bytes());
    for (name, value) in fields {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn opt<T: ToString>(v: &Option<T>) -> String {
    v.as_ref().map(|x| x.to_string()).unwrap_or_default()
}

pub(crate) fn transcript_key_v(
    version: u32,
    url: &str,
    namespace: &str,
    file_mtime_ms: Option<i64>,
) -> String {
    fingerprint(
        version,
        &[
            ("url", url.to_string()),
            ("ns", namespace.to_string()),
            ("mtime", opt(&file_mtime_ms)),
        ],
    )
}

/// Key for a cached transcript.
pub fn transcript_key(url: &str, namespace: &str, file_mtime_ms: Option<i64>) -> String {
    transcript_key_v(FORMAT_VERSION, url, namespace, file_mtime_ms)
}

pub(crate) fn content_key_v(version: u32, url: &str, settings: &ExtractSettingsKey) -> String {
    fingerprint(
        version,
        &[
            ("url", url.to_string()),
            ("firecrawl", settings.firecrawl.clone()),
            ("markdown", settings.markdown.clone()),
            ("maxChars", opt(&settings.max_characters)),
        ],
    )
}

/// Key for cached extracted content.
pub fn content_key(url: &str, settings: &ExtractSettingsKey) -> String {
    content_key_v(FORMAT_VERSION, url, settings)
}

pub(crate) fn summary_key_v(
    version: u32,
    content_hash: &str,
    prompt_hash: &str,
    model: &str,
    length: &str,
    language: &str,
) -> String {
    fingerprint(
        version,
        &[
            ("content", content_hash.to_string()),
            ("prompt", prompt_hash.to_string()),
            ("model", model.to_string()),
            ("length", length.to_string()),
            ("language", language.to_string()),
        ],
    )
}

/// Key for a cached summary. `content_hash` is over the normalized content,
/// so two URLs with identical normalized content share a summary.
pub fn summary_key(
    content_hash: &str,
    prompt_hash: &str,
    model: &str,
    length: &str,
    language: &str,
) -> String {
    summary_key_v(FORMAT_VERSION, content_hash, prompt_hash, model, length, language)
}

pub(crate) fn slides_key_v(version: u32, url: &str, settings: &SlideSettingsKey) -> String {
    fingerprint(
        version,
        &[
            ("url", url.to_string()),
            ("threshold", opt(&settings.scene_threshold)),
            ("maxSlides", settings.max_slides.to_string()),
            ("minDuration", format!("{:.3}", settings.min_slide_duration)),
            ("ocr", settings.ocr.to_string()),
        ],
    )
}

/// Key for a cached slide manifest.
pub fn slides_key(url: &str, settings: &SlideSettingsKey) -> String {
    slides_key_v(FORMAT_VERSION, url, settings)
}

/// SHA-256 hex digest of arbitrary text (content/prompt hashing).
pub fn text_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_pure_function_of_inputs() {
        let settings = ExtractSettingsKey {
            firecrawl: "auto".into(),
            markdown: "off".into(),
            max_characters: None,
        };
        let a = content_key("https://example.com/", &settings);
        let b = content_key("https://example.com/", &settings.clone());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_documented_inputs_change_key() {
        let base = ExtractSettingsKey {
            firecrawl: "auto".into(),
            markdown: "off".into(),
            max_characters: None,
        };
        let changed = ExtractSettingsKey {
            firecrawl: "always".into(),
            ..base.clone()
        };
        assert_ne!(
            content_key("https://example.com/", &base),
            content_key("https://example.com/", &changed)
        );
        assert_ne!(
            content_key("https://example.com/", &base),
            content_key("https://example.org/", &base)
        );
    }

    #[test]
    fn test_format_version_changes_every_key() {
        let settings = ExtractSettingsKey::default();
        assert_ne!(
            content_key_v(1, "https://a/", &settings),
            content_key_v(2, "https://a/", &settings)
        );
        assert_ne!(
            transcript_key_v(1, "https://a/", "yt:auto", None),
            transcript_key_v(2, "https://a/", "yt:auto", None)
        );
        assert_ne!(
            summary_key_v(1, "c", "p", "openai/gpt-4o", "medium", "English"),
            summary_key_v(2, "c", "p", "openai/gpt-4o", "medium", "English")
        );
        assert_ne!(
            slides_key_v(1, "https://a/", &SlideSettingsKey::default()),
            slides_key_v(2, "https://a/", &SlideSettingsKey::default())
        );
    }

    #[test]
    fn test_transcript_key_namespaces_differ() {
        let a = transcript_key("https://youtu.be/dQw4w9WgXcQ", "yt:auto", None);
        let b = transcript_key("https://youtu.be/dQw4w9WgXcQ", "yt:actor", None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_mtime_participates() {
        let a = transcript_key("file:///tmp/a.mp3", "media", Some(1_000));
        let b = transcript_key("file:///tmp/a.mp3", "media", Some(2_000));
        assert_ne!(a, b);
    }
}
