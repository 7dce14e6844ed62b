//! Slide-extraction settings and manifest types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// What kind of video source the slides came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Youtube,
    Direct,
}

/// Settings for one slide-extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideSettings {
    /// Fixed scene threshold; `None` enables auto-tune calibration.
    pub scene_threshold: Option<f64>,
    pub max_slides: u32,
    /// Minimum spacing between successive slides, seconds.
    pub min_slide_duration: f64,
    pub ocr: bool,
    /// Parallel worker count, clamped to [1, 16].
    pub workers: u32,
    /// Calibration sample count, clamped to [3, 12].
    pub calibration_samples: u32,
}

impl Default for SlideSettings {
    fn default() -> Self {
        Self {
            scene_threshold: None,
            max_slides: 40,
            min_slide_duration: 5.0,
            ocr: false,
            workers: 8,
            calibration_samples: 8,
        }
    }
}

impl SlideSettings {
    pub fn clamped_workers(&self) -> u32 {
        self.workers.clamp(1, 16)
    }

    pub fn clamped_samples(&self) -> u32 {
        self.calibration_samples.clamp(3, 12)
    }
}

/// Auto-tune calibration diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoTuneInfo {
    pub enabled: bool,
    pub chosen_threshold: f64,
    /// In [0, 1]; how confident the calibration was in its choice.
    pub confidence: f64,
    /// Diagnostic only; consumers do not branch on this.
    pub strategy: String,
}

/// One extracted slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideFrame {
    /// 1-based, contiguous, sorted by timestamp.
    pub index: u32,
    /// Seconds from the start of the video.
    pub timestamp: f64,
    pub image_path: PathBuf,
    /// Bumped when refinement replaced the original frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f64>,
}

/// The `slides.json` manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideExtractionResult {
    pub source_url: String,
    pub source_kind: SourceKind,
    pub source_id: String,
    pub slides_dir: PathBuf,
    /// Stable hash of `slides_dir`; detects a relocated directory.
    pub slides_dir_id: String,
    pub scene_threshold: f64,
    pub auto_tune: AutoTuneInfo,
    pub max_slides: u32,
    pub min_slide_duration: f64,
    pub ocr_requested: bool,
    pub ocr_available: bool,
    pub slides: Vec<SlideFrame>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Stable identifier for a slides directory path.
pub fn slides_dir_id(dir: &Path) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(dir.to_string_lossy().as_bytes());
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}

impl SlideExtractionResult {
    /// Check that every image path resolves inside `slides_dir`.
    ///
    /// Rejects absolute escapes and `..` traversal without requiring the
    /// files to exist.
    pub fn paths_contained(&self) -> bool {
        self.slides.iter().all(|s| {
            let p = &s.image_path;
            let joined = if p.is_absolute() {
                p.clone()
            } else {
                self.slides_dir.join(p)
            };
            path_is_within(&joined, &self.slides_dir)
        })
    }

    /// Check the ordering/spacing invariants over slide timestamps.
    pub fn spacing_ok(&self) -> bool {
        let indexed = self
            .slides
            .iter()
            .enumerate()
            .all(|(i, s)| s.index == i as u32 + 1);
        let spaced = self
            .slides
            .windows(2)
            .all(|w| w[1].timestamp - w[0].timestamp >= self.min_slide_duration);
        indexed && spaced
    }
}

/// Lexically resolve `..`/`.` and test containment, without touching the
/// filesystem (candidate files may not exist yet).
pub fn path_is_within(candidate: &Path, root: &Path) -> bool {
    use std::path::Component;

    let mut resolved = PathBuf::new();
    for comp in candidate.components() {
        match comp {
            Component::ParentDir => {
                if !resolved.pop() {
                    return false;
                }
            }
            Component::CurDir => {}
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(slides: Vec<SlideFrame>) -> SlideExtractionResult {
        let dir = PathBuf::from("/tmp/slides/abc");
        SlideExtractionResult {
            source_url: "https://youtu.be/dQw4w9WgXcQ".into(),
            source_kind: SourceKind::Youtube,
            source_id: "dQw4w9WgXcQ".into(),
            slides_dir_id: slides_dir_id(&dir),
            slides_dir: dir,
            scene_threshold: 0.12,
            auto_tune: AutoTuneInfo {
                enabled: true,
                chosen_threshold: 0.12,
                confidence: 0.6,
                strategy: "hash".into(),
            },
            max_slides: 40,
            min_slide_duration: 5.0,
            ocr_requested: false,
            ocr_available: false,
            slides,
            warnings: vec![],
        }
    }

    fn frame(index: u32, ts: f64, path: &str) -> SlideFrame {
        SlideFrame {
            index,
            timestamp: ts,
            image_path: PathBuf::from(path),
            image_version: None,
            ocr_text: None,
            ocr_confidence: None,
        }
    }

    #[test]
    fn test_path_escape_rejected() {
        let ok = manifest(vec![frame(1, 0.0, "slide_0001_0s.png")]);
        assert!(ok.paths_contained());

        let escape = manifest(vec![frame(1, 0.0, "../../etc/passwd")]);
        assert!(!escape.paths_contained());

        let absolute = manifest(vec![frame(1, 0.0, "/etc/passwd")]);
        assert!(!absolute.paths_contained());
    }

    #[test]
    fn test_spacing_invariant() {
        let ok = manifest(vec![
            frame(1, 0.0, "a.png"),
            frame(2, 5.0, "b.png"),
            frame(3, 12.5, "c.png"),
        ]);
        assert!(ok.spacing_ok());

        let tight = manifest(vec![frame(1, 0.0, "a.png"), frame(2, 2.0, "b.png")]);
        assert!(!tight.spacing_ok());

        let misindexed = manifest(vec![frame(1, 0.0, "a.png"), frame(3, 9.0, "b.png")]);
        assert!(!misindexed.spacing_ok());
    }

    #[test]
    fn test_slides_dir_id_stable() {
        let a = slides_dir_id(Path::new("/tmp/slides/abc"));
        let b = slides_dir_id(Path::new("/tmp/slides/abc"));
        let c = slides_dir_id(Path::new("/tmp/slides/other"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
