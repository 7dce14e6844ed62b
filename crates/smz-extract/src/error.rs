//! Error types for extraction.

use thiserror::Error;

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Errors that can occur during content extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no content could be extracted from {url}{}", format_diagnostics(.diagnostics))]
    NoContent {
        url: String,
        diagnostics: Vec<String>,
    },

    #[error("expected a media asset at {0} but received an HTML page")]
    AssetIsHtml(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("fetch failed: {0}")]
    Http(reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error(transparent)]
    Cache(#[from] smz_cache::CacheError),

    #[error(transparent)]
    Llm(#[from] smz_llm::LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ExtractError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ExtractError::Timeout
        } else {
            ExtractError::Http(e)
        }
    }
}

fn format_diagnostics(diagnostics: &[String]) -> String {
    if diagnostics.is_empty() {
        String::new()
    } else {
        format!(" ({})", diagnostics.join("; "))
    }
}
