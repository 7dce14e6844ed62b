//! Content extraction: web pages, YouTube transcripts, direct media.
//!
//! One input URL goes through an ordered strategy list; individual strategy
//! failures append diagnostics and fall through, and only a terminal lack of
//! any content is an error. The final URL reported to callers is always the
//! post-redirect URL.

pub mod article;
pub mod error;
pub mod fetch;
pub mod firecrawl;
pub mod media;
pub mod pipeline;
pub mod retry;
pub mod youtube;

pub use error::{ExtractError, ExtractResult};
pub use pipeline::{ExtractOptions, Extractor, FirecrawlMode, MarkdownMode};
