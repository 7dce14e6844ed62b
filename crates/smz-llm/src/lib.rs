//! LLM access for the summarize pipeline.
//!
//! Vendor SDK surface area is reduced to one capability trait,
//! [`LlmClient`]: `generate` for one-shot text and `stream` for a delta
//! channel plus a usage future. Variants are selected at construction time
//! from the gateway-style provider prefix.

pub mod anthropic;
pub mod client;
pub mod error;
pub mod google;
pub mod merge;
pub mod openai;
pub mod ranker;
pub mod registry;
pub mod sse;

pub use client::{Attachment, GenerateRequest, Generated, LlmClient, StreamHandle};
pub use error::{LlmError, LlmResult};
pub use merge::{clean_visible_text, merge_streaming_chunk};
pub use ranker::{
    fetch_catalog, filter_candidates, parse_catalog, rank_free_models, FreeModelCandidate,
    RankOptions,
};
pub use registry::{InputClass, ModelRegistry, Preset, PresetRule, RegistryConfig};
