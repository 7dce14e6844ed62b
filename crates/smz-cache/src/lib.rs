//! Caches for the summarize pipeline.
//!
//! Two tiers:
//! - [`MetaStore`]: a transactional SQLite-backed store for transcripts,
//!   extracted content, summaries and slide manifests, with TTL + byte-cap
//!   eviction on every touch.
//! - [`MediaCache`]: a file-backed LRU+TTL cache for downloaded media with
//!   configurable integrity verification and a crash-safe JSON index.

pub mod error;
mod fs;
pub mod media;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use fs::move_file;
pub use media::{MediaCache, MediaCacheConfig, MediaCacheEntry, VerifyMode};
pub use store::{MetaStore, MetaStoreConfig, Namespace, StoreStats};
