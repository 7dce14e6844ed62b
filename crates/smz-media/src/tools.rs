//! External tool discovery.
//!
//! Each tool path is resolved once: explicit env override first
//! (`FFMPEG_PATH`, `FFPROBE_PATH`, `YT_DLP_PATH`, `TESSERACT_PATH`),
//! then a PATH lookup. Missing tools are surfaced lazily so a run that
//! never needs OCR does not require tesseract.

use std::path::PathBuf;

use crate::error::{MediaError, MediaResult};

/// Resolved (or resolvable) paths to the external tools.
#[derive(Debug, Clone, Default)]
pub struct ToolPaths {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub ytdlp: Option<PathBuf>,
    pub tesseract: Option<PathBuf>,
}

fn lookup(
    env: &impl Fn(&str) -> Option<String>,
    env_name: &str,
    binary: &str,
) -> Option<PathBuf> {
    if let Some(explicit) = env(env_name) {
        let path = PathBuf::from(explicit);
        if path.exists() {
            return Some(path);
        }
    }
    which::which(binary).ok()
}

impl ToolPaths {
    /// Resolve all tools through an env lookup (usually the runtime context).
    pub fn resolve(env: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            ffmpeg: lookup(&env, "FFMPEG_PATH", "ffmpeg"),
            ffprobe: lookup(&env, "FFPROBE_PATH", "ffprobe"),
            ytdlp: lookup(&env, "YT_DLP_PATH", "yt-dlp"),
            tesseract: lookup(&env, "TESSERACT_PATH", "tesseract"),
        }
    }

    pub fn ffmpeg(&self) -> MediaResult<&PathBuf> {
        self.ffmpeg.as_ref().ok_or(MediaError::ToolNotFound {
            tool: "ffmpeg",
            env: "FFMPEG_PATH",
        })
    }

    pub fn ffprobe(&self) -> MediaResult<&PathBuf> {
        self.ffprobe.as_ref().ok_or(MediaError::ToolNotFound {
            tool: "ffprobe",
            env: "FFPROBE_PATH",
        })
    }

    pub fn ytdlp(&self) -> MediaResult<&PathBuf> {
        self.ytdlp.as_ref().ok_or(MediaError::ToolNotFound {
            tool: "yt-dlp",
            env: "YT_DLP_PATH",
        })
    }

    pub fn tesseract(&self) -> MediaResult<&PathBuf> {
        self.tesseract.as_ref().ok_or(MediaError::ToolNotFound {
            tool: "tesseract",
            env: "TESSERACT_PATH",
        })
    }

    /// Whether OCR can run at all.
    pub fn ocr_available(&self) -> bool {
        self.tesseract.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_error_names_env() {
        let tools = ToolPaths::default();
        let err = tools.tesseract().unwrap_err();
        assert!(err.to_string().contains("TESSERACT_PATH"));
    }

    #[test]
    fn test_env_override_requires_existing_path() {
        // A bogus override falls back to PATH lookup (possibly None).
        let tools = ToolPaths::resolve(|name| {
            (name == "FFMPEG_PATH").then(|| "/definitely/not/here/ffmpeg".to_string())
        });
        if let Some(path) = tools.ffmpeg {
            assert_ne!(path, PathBuf::from("/definitely/not/here/ffmpeg"));
        }
    }
}
