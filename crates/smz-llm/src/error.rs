//! Error types for LLM access.
//!
//! Provider rejections are rewritten into user-actionable messages naming
//! the rejected model; raw vendor error bodies stay out of the terminal.

use thiserror::Error;

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur while talking to a model provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no API key configured for {provider} (set {env})")]
    MissingApiKey { provider: String, env: String },

    #[error("model '{model}' was rejected by {provider}: {message}")]
    ModelAccess {
        provider: String,
        model: String,
        message: String,
    },

    #[error("model '{model}' does not support attaching files ({media_type})")]
    AttachmentUnsupported { model: String, media_type: String },

    #[error("rate limited: {message}")]
    RateLimited { message: String },

    #[error("request timed out")]
    Timeout,

    #[error("model returned no output")]
    EmptyOutput,

    #[error("unknown model preset '{0}'")]
    UnknownPreset(String),

    #[error("unsupported provider '{0}'")]
    UnsupportedProvider(String),

    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("response parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Http(e)
        }
    }
}

/// Vendor substrings that mean "this model cannot take the attachment".
const ATTACHMENT_SIGNATURES: &[&str] = &[
    "does not support image",
    "does not support file",
    "image input is not supported",
    "unsupported content type",
    "invalid content type",
    "media type is not supported",
];

impl LlmError {
    /// Classify a non-2xx provider response into an actionable error.
    ///
    /// 401/403/404 become [`LlmError::ModelAccess`] naming the model; 404
    /// from Anthropic arrives as a `not_found_error` body and gets the same
    /// treatment. 429 becomes [`LlmError::RateLimited`].
    pub fn from_status(provider: &str, model: &str, status: u16, body: &str) -> Self {
        let message = extract_api_message(body);

        if let Some(media_type) = attachment_rejection(&message) {
            return LlmError::AttachmentUnsupported {
                model: model.to_string(),
                media_type,
            };
        }

        match status {
            401 | 403 => LlmError::ModelAccess {
                provider: provider.to_string(),
                model: model.to_string(),
                message: format!("access denied ({status}); check the API key and model access"),
            },
            404 => LlmError::ModelAccess {
                provider: provider.to_string(),
                model: model.to_string(),
                message: "model not found; check the model name and your account's access"
                    .to_string(),
            },
            429 => LlmError::RateLimited { message },
            _ => LlmError::Api {
                provider: provider.to_string(),
                status,
                message,
            },
        }
    }

    /// Whether this error should trigger auto-mode fallback to the next
    /// candidate instead of aborting the run.
    pub fn is_fallback_worthy(&self) -> bool {
        matches!(
            self,
            LlmError::MissingApiKey { .. }
                | LlmError::ModelAccess { .. }
                | LlmError::RateLimited { .. }
                | LlmError::EmptyOutput
        )
    }
}

/// Pull a human message out of a vendor error body, tolerating non-JSON.
fn extract_api_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for path in [&["error", "message"][..], &["message"][..], &["detail"][..]] {
            let mut cur = &value;
            let mut ok = true;
            for key in path {
                match cur.get(key) {
                    Some(next) => cur = next,
                    None => {
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                if let Some(s) = cur.as_str() {
                    return s.to_string();
                }
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no error body".to_string()
    } else {
        trimmed.chars().take(300).collect()
    }
}

/// Detect attachment-rejection signatures; returns the named media type.
fn attachment_rejection(message: &str) -> Option<String> {
    let lowered = message.to_lowercase();
    ATTACHMENT_SIGNATURES
        .iter()
        .find(|sig| lowered.contains(*sig))
        .map(|_| {
            for mt in ["pdf", "image", "audio", "video", "file"] {
                if lowered.contains(mt) {
                    return mt.to_string();
                }
            }
            "attachment".to_string()
        })
}
