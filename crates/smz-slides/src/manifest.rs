//! Slide manifest persistence and cache validation.

use std::path::{Path, PathBuf};

use smz_models::{path_is_within, slides_dir_id, SlideExtractionResult, SlideSettings, SourceKind};
use tracing::debug;

use crate::error::SlidesResult;

const MANIFEST_FILE: &str = "slides.json";

/// What a cached manifest must match to be reused.
#[derive(Debug, Clone)]
pub struct ManifestExpectations {
    pub source_url: String,
    pub source_kind: SourceKind,
    pub source_id: String,
    /// Parent of the per-source slides directory.
    pub output_dir: PathBuf,
    pub settings: SlideSettings,
}

/// Write `slides.json` into the slides directory (temp → rename).
///
/// After this write the result is immutable.
pub async fn write_manifest(result: &SlideExtractionResult) -> SlidesResult<PathBuf> {
    let final_path = result.slides_dir.join(MANIFEST_FILE);
    let tmp_path = result.slides_dir.join(format!("{MANIFEST_FILE}.tmp"));

    let bytes = serde_json::to_vec_pretty(result)?;
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, &final_path).await?;
    Ok(final_path)
}

/// Try to reuse a previously written manifest.
///
/// Returns `None` (a cache miss, not an error) unless source identity,
/// directory identity, settings, path containment, and on-disk images all
/// check out.
pub async fn load_validated_manifest(
    expectations: &ManifestExpectations,
) -> Option<SlideExtractionResult> {
    let slides_dir = expectations.output_dir.join(&expectations.source_id);
    let manifest_path = slides_dir.join(MANIFEST_FILE);

    let bytes = tokio::fs::read(&manifest_path).await.ok()?;
    let manifest: SlideExtractionResult = match serde_json::from_slice(&bytes) {
        Ok(m) => m,
        Err(e) => {
            debug!(path = %manifest_path.display(), error = %e, "Corrupt slides manifest, ignoring");
            return None;
        }
    };

    if manifest.source_id != expectations.source_id
        || manifest.source_kind != expectations.source_kind
        || manifest.source_url != expectations.source_url
    {
        debug!("Slides manifest source mismatch, re-extracting");
        return None;
    }

    if manifest.slides_dir != slides_dir || manifest.slides_dir_id != slides_dir_id(&slides_dir) {
        debug!("Slides manifest directory relocated, re-extracting");
        return None;
    }

    if !settings_match(&manifest, &expectations.settings) {
        debug!("Slides manifest settings mismatch, re-extracting");
        return None;
    }

    if !manifest.paths_contained() {
        debug!("Slides manifest contains escaping paths, rejecting");
        return None;
    }

    for slide in &manifest.slides {
        let image = resolve_image_path(&manifest.slides_dir, &slide.image_path);
        if !path_is_within(&image, &manifest.slides_dir) {
            return None;
        }
        if !image.exists() {
            debug!(image = %image.display(), "Cached slide image missing, re-extracting");
            return None;
        }
    }

    Some(manifest)
}

/// Resolve a manifest image path against the slides directory.
pub fn resolve_image_path(slides_dir: &Path, image_path: &Path) -> PathBuf {
    if image_path.is_absolute() {
        image_path.to_path_buf()
    } else {
        slides_dir.join(image_path)
    }
}

fn settings_match(manifest: &SlideExtractionResult, settings: &SlideSettings) -> bool {
    if manifest.max_slides != settings.max_slides {
        return false;
    }
    if (manifest.min_slide_duration - settings.min_slide_duration).abs() > 1e-9 {
        return false;
    }
    if manifest.ocr_requested != settings.ocr {
        return false;
    }
    // A fixed threshold must match; auto-tune accepts whatever was chosen.
    if let Some(fixed) = settings.scene_threshold {
        if (manifest.scene_threshold - fixed).abs() > 1e-9 {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use smz_models::{AutoTuneInfo, SlideFrame};
    use tempfile::TempDir;

    fn expectations(output_dir: &Path) -> ManifestExpectations {
        ManifestExpectations {
            source_url: "https://youtu.be/dQw4w9WgXcQ".into(),
            source_kind: SourceKind::Youtube,
            source_id: "dQw4w9WgXcQ".into(),
            output_dir: output_dir.to_path_buf(),
            settings: SlideSettings::default(),
        }
    }

    async fn written_manifest(output_dir: &Path) -> SlideExtractionResult {
        let slides_dir = output_dir.join("dQw4w9WgXcQ");
        tokio::fs::create_dir_all(&slides_dir).await.unwrap();
        let image = "slide_0001_10s.png";
        tokio::fs::write(slides_dir.join(image), b"png").await.unwrap();

        let result = SlideExtractionResult {
            source_url: "https://youtu.be/dQw4w9WgXcQ".into(),
            source_kind: SourceKind::Youtube,
            source_id: "dQw4w9WgXcQ".into(),
            slides_dir_id: slides_dir_id(&slides_dir),
            slides_dir,
            scene_threshold: 0.1,
            auto_tune: AutoTuneInfo {
                enabled: true,
                chosen_threshold: 0.1,
                confidence: 0.5,
                strategy: "hash".into(),
            },
            max_slides: SlideSettings::default().max_slides,
            min_slide_duration: SlideSettings::default().min_slide_duration,
            ocr_requested: false,
            ocr_available: false,
            slides: vec![SlideFrame {
                index: 1,
                timestamp: 10.0,
                image_path: PathBuf::from(image),
                image_version: None,
                ocr_text: None,
                ocr_confidence: None,
            }],
            warnings: vec![],
        };
        write_manifest(&result).await.unwrap();
        result
    }

    #[tokio::test]
    async fn test_roundtrip_validates() {
        let dir = TempDir::new().unwrap();
        let written = written_manifest(dir.path()).await;
        let loaded = load_validated_manifest(&expectations(dir.path())).await;
        assert_eq!(loaded, Some(written));
    }

    #[tokio::test]
    async fn test_missing_image_invalidates() {
        let dir = TempDir::new().unwrap();
        let written = written_manifest(dir.path()).await;
        tokio::fs::remove_file(written.slides_dir.join("slide_0001_10s.png"))
            .await
            .unwrap();
        assert!(load_validated_manifest(&expectations(dir.path())).await.is_none());
    }

    #[tokio::test]
    async fn test_settings_mismatch_invalidates() {
        let dir = TempDir::new().unwrap();
        written_manifest(dir.path()).await;
        let mut exp = expectations(dir.path());
        exp.settings.ocr = true;
        assert!(load_validated_manifest(&exp).await.is_none());
    }

    #[tokio::test]
    async fn test_relocated_dir_invalidates() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let written = written_manifest(dir.path()).await;

        // Move the whole slides dir somewhere else; recorded dir id no longer
        // matches the new location.
        let moved = other.path().join("dQw4w9WgXcQ");
        tokio::fs::rename(&written.slides_dir, &moved).await.unwrap();
        assert!(load_validated_manifest(&expectations(other.path())).await.is_none());
    }

    #[tokio::test]
    async fn test_escaping_path_rejected() {
        let dir = TempDir::new().unwrap();
        let mut written = written_manifest(dir.path()).await;
        written.slides[0].image_path = PathBuf::from("../escape.png");
        write_manifest(&written).await.unwrap();
        assert!(load_validated_manifest(&expectations(dir.path())).await.is_none());
    }

    #[tokio::test]
    async fn test_fixed_threshold_must_match() {
        let dir = TempDir::new().unwrap();
        written_manifest(dir.path()).await;
        let mut exp = expectations(dir.path());
        exp.settings.scene_threshold = Some(0.25);
        assert!(load_validated_manifest(&exp).await.is_none());

        exp.settings.scene_threshold = Some(0.1);
        assert!(load_validated_manifest(&exp).await.is_some());
    }
}
