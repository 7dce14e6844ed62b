//! Input classification and extracted-content types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors from classifying raw input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("unsupported scheme '{0}' (expected http, https or file)")]
    UnsupportedScheme(String),
    #[error("not a valid URL or file path: {0}")]
    Invalid(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
}

/// Classified input: a URL to fetch or a local file to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InputTarget {
    Url { url: String },
    File { path: PathBuf },
}

/// Coarse URL classification, decided by pathname-extension heuristics.
///
/// `Asset` is refined when the first bytes arrive: a response that sniffs as
/// HTML demotes the classification to an error at the fetch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlKind {
    Website,
    Asset,
}

/// Extensions treated as direct media/document assets.
const ASSET_EXTENSIONS: &[&str] = &[
    "pdf", "mp3", "m4a", "wav", "flac", "ogg", "oga", "opus", "aac", "mp4", "m4v", "mov", "mkv",
    "webm", "avi", "png", "jpg", "jpeg", "gif", "webp", "svg", "zip", "csv", "epub",
];

/// Classify a URL as website or direct asset by its pathname extension.
pub fn classify_url_kind(url: &Url) -> UrlKind {
    let path = url.path();
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|seg| seg.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext {
        Some(e) if ASSET_EXTENSIONS.contains(&e.as_str()) => UrlKind::Asset,
        _ => UrlKind::Website,
    }
}

/// Recover an http(s) URL embedded after a foreign scheme prefix.
///
/// Some launchers hand over inputs like `vscode://open?url=https://a/b` or a
/// reader-mode wrapper; the last embedded `http(s)://` occurrence wins.
fn embedded_http_url(raw: &str) -> Option<&str> {
    let https = raw.rfind("https://");
    let http = raw.rfind("http://");
    let idx = match (https, http) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }?;
    if idx == 0 {
        return None;
    }
    Some(&raw[idx..])
}

/// Classify raw CLI/daemon input into a target.
///
/// Accepts http(s) and `file:` URLs and bare filesystem paths. Any other
/// scheme is rejected unless an embedded http(s) prefix can be extracted.
pub fn classify_input(raw: &str) -> Result<InputTarget, InputError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(InputError::Invalid(String::new()));
    }

    if let Ok(url) = Url::parse(raw) {
        match url.scheme() {
            "http" | "https" => {
                return Ok(InputTarget::Url {
                    url: url.to_string(),
                })
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| InputError::Invalid(raw.to_string()))?;
                return Ok(InputTarget::File { path });
            }
            other => {
                if let Some(inner) = embedded_http_url(raw) {
                    return classify_input(inner);
                }
                return Err(InputError::UnsupportedScheme(other.to_string()));
            }
        }
    }

    // Not a URL; treat as a local path.
    Ok(InputTarget::File {
        path: PathBuf::from(raw),
    })
}

/// Embedded video kind discovered during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoKind {
    Youtube,
    Direct,
}

/// A video reference attached to extracted content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRef {
    pub kind: VideoKind,
    pub url: String,
}

/// Transcript details when the content came from audio/video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptInfo {
    /// Where the transcript came from (`captions`, `timedtext`, `actor`, `transcription`).
    pub source: String,
    pub chars: usize,
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// The extractor's output for one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedContent {
    /// Final URL after redirects, as reported by the fetch layer.
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    /// Normalized text or Markdown.
    pub content: String,
    pub truncated: bool,
    pub total_characters: usize,
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<TranscriptInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoRef>,
    /// True when the page had no article text but exactly one embedded video.
    #[serde(default)]
    pub is_video_only: bool,
    /// Per-strategy notes accumulated along the way; never fatal on their own.
    #[serde(default)]
    pub diagnostics: Vec<String>,
}

impl ExtractedContent {
    /// Normalized form used for content-addressed summary caching:
    /// whitespace collapsed so byte-identical prose on two URLs shares a key.
    pub fn normalized(&self) -> String {
        self.content.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn word_count_of(text: &str) -> usize {
        text.split_whitespace().count()
    }
}
