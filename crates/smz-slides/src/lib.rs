//! Slide extraction: per-scene frames and optional OCR for a video source.
//!
//! The pipeline runs probe → calibrate → segmented parallel detection →
//! merge/select → parallel frame extraction → brightness refinement →
//! rename → optional OCR → manifest. Concurrent extraction for the same
//! slides directory is serialized by a keyed lock.

pub mod calibrate;
pub mod error;
pub mod lock;
pub mod manifest;
pub mod ocr;
pub mod pipeline;
pub mod progress;
pub mod refine;
pub mod segment;
pub mod select;

pub use error::{SlidesError, SlidesResult};
pub use lock::DirLocks;
pub use manifest::{load_validated_manifest, write_manifest, ManifestExpectations};
pub use pipeline::{extract_slides, ProgressFn, SlidesRequest};
pub use progress::{Phase, SlidesProgress};
