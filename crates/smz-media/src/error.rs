//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while driving external media tools.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{tool} not found (set {env} or install it on PATH)")]
    ToolNotFound { tool: &'static str, env: &'static str },

    #[error("{tool} failed: {message}")]
    CommandFailed {
        tool: String,
        message: String,
        stderr: Option<String>,
    },

    #[error("download failed: {message}")]
    DownloadFailed { message: String },

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("invalid media: {0}")]
    InvalidMedia(String),

    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create a command failure from captured output.
    pub fn command_failed(
        tool: impl Into<String>,
        message: impl Into<String>,
        stderr: Option<String>,
    ) -> Self {
        Self::CommandFailed {
            tool: tool.into(),
            message: message.into(),
            stderr,
        }
    }

    /// Create a download failure.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }
}
