//! Error types for the orchestration core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while orchestrating a run.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "input token count ({estimated}) exceeds the model cap ({cap}); refusing to summarize"
    )]
    InputTooLarge { estimated: u64, cap: u64 },

    #[error("model produced an empty summary")]
    EmptySummary,

    #[error("{0}")]
    AllCandidatesFailed(String),

    #[error(transparent)]
    Llm(#[from] smz_llm::LlmError),

    #[error(transparent)]
    Extract(#[from] smz_extract::ExtractError),

    #[error(transparent)]
    Cache(#[from] smz_cache::CacheError),

    #[error(transparent)]
    Slides(#[from] smz_slides::SlidesError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
