//! Error types for slide extraction.

use thiserror::Error;

/// Result type for slide extraction.
pub type SlidesResult<T> = Result<T, SlidesError>;

/// Errors that can occur during slide extraction.
#[derive(Debug, Error)]
pub enum SlidesError {
    #[error(transparent)]
    Media(#[from] smz_media::MediaError),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("no frames could be extracted")]
    NoFrames,

    #[error("manifest invalid: {0}")]
    InvalidManifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
