//! Slide OCR via tesseract.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use smz_media::{MediaError, ToolPaths};
use tokio::process::Command;
use tracing::debug;

use crate::error::SlidesResult;

/// Cleaned OCR output with a confidence estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutcome {
    pub text: String,
    /// Alphanumeric ratio of the cleaned text, in [0, 1].
    pub confidence: f64,
}

/// Run tesseract on one slide image.
pub async fn ocr_slide(
    tools: &ToolPaths,
    image: &Path,
    timeout: Duration,
) -> SlidesResult<Option<OcrOutcome>> {
    let tesseract = tools.tesseract()?;

    let child = Command::new(tesseract)
        .arg(image)
        .arg("stdout")
        .args(["--psm", "6"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(MediaError::from)?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| MediaError::Timeout(timeout.as_secs()))?
        .map_err(MediaError::from)?;

    if !output.status.success() {
        debug!(
            image = %image.display(),
            stderr = %String::from_utf8_lossy(&output.stderr),
            "tesseract failed for slide"
        );
        return Ok(None);
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    Ok(clean_ocr_text(&raw))
}

/// Clean raw OCR output.
///
/// Drops lines under 2 chars, lines over 20 chars with no spaces (noise
/// runs), and lines with no alphanumeric character at all. Confidence is
/// the alphanumeric ratio of what survives.
pub fn clean_ocr_text(raw: &str) -> Option<OcrOutcome> {
    let kept: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| {
            let chars = line.chars().count();
            if chars < 2 {
                return false;
            }
            if chars > 20 && !line.contains(' ') {
                return false;
            }
            line.chars().any(|c| c.is_ascii_alphanumeric())
        })
        .collect();

    if kept.is_empty() {
        return None;
    }

    let text = kept.join("\n");
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    let alnum = text.chars().filter(|c| c.is_ascii_alphanumeric()).count();
    let confidence = if total == 0 {
        0.0
    } else {
        (alnum as f64 / total as f64).clamp(0.0, 1.0)
    };

    Some(OcrOutcome { text, confidence })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_drops_noise_lines() {
        let raw = "\
Agenda\n\
.\n\
|||||||||||||||||||||||||\n\
- Quarterly results\n\
~~~~~\n";
        let out = clean_ocr_text(raw).unwrap();
        assert_eq!(out.text, "Agenda\n- Quarterly results");
    }

    #[test]
    fn test_clean_drops_long_spaceless_runs() {
        let raw = "aaaaaaaaaaaaaaaaaaaaaaaaaaaa\nreal words here\n";
        let out = clean_ocr_text(raw).unwrap();
        assert_eq!(out.text, "real words here");
    }

    #[test]
    fn test_clean_empty_returns_none() {
        assert_eq!(clean_ocr_text(""), None);
        assert_eq!(clean_ocr_text(".\n-\n~\n"), None);
    }

    #[test]
    fn test_confidence_is_alnum_ratio() {
        let out = clean_ocr_text("abc!").unwrap();
        assert!((out.confidence - 0.75).abs() < 1e-9);

        let clean = clean_ocr_text("abcd").unwrap();
        assert!((clean.confidence - 1.0).abs() < 1e-9);
    }
}
