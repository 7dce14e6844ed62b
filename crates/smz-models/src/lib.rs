//! Shared data models for the summarize pipeline.
//!
//! This crate provides serde-serializable types and pure logic for:
//! - Gateway-style model identifiers and pricing lookups
//! - Input classification (website / asset / YouTube / file)
//! - Cache-key fingerprints
//! - Slide manifests
//! - Run events and cost bookkeeping
//! - Language and summary-length resolution

pub mod content;
pub mod cost;
pub mod events;
pub mod keys;
pub mod language;
pub mod length;
pub mod model_id;
pub mod pricing;
pub mod slides;
pub mod timeout;
pub mod youtube;

// Re-export common types
pub use content::{
    classify_input, classify_url_kind, ExtractedContent, InputTarget, TranscriptInfo, UrlKind,
    VideoKind, VideoRef,
};
pub use cost::{CallPurpose, CostBook, CostReport, CostRow, LlmCall, TokenUsage};
pub use events::{RunEvent, RunState};
pub use keys::{
    content_key, slides_key, summary_key, text_hash, transcript_key, ExtractSettingsKey,
    SlideSettingsKey, FORMAT_VERSION,
};
pub use language::{resolve_language, Language};
pub use length::SummaryLength;
pub use model_id::{ModelId, ModelIdError, Provider};
pub use pricing::{ModelPricing, PricingTable};
pub use slides::{
    path_is_within, slides_dir_id, AutoTuneInfo, SlideExtractionResult, SlideFrame, SlideSettings,
    SourceKind,
};
pub use timeout::parse_timeout;
pub use youtube::{extract_youtube_id, is_youtube_url, media_source_id, YoutubeIdError};
