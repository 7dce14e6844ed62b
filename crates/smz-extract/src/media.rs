//! Direct-media transcription.
//!
//! Downloads route through the media cache; transcription goes to the
//! OpenAI audio endpoint as a multipart upload.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ExtractError, ExtractResult};

const TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const TRANSCRIPTION_MODEL: &str = "whisper-1";

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Guess the MIME type for an uploaded media file.
pub fn media_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("ogg") | Some("oga") | Some("opus") => "audio/ogg",
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Transcribe a local media file.
pub async fn transcribe_media(
    http: &reqwest::Client,
    api_key: &str,
    path: &Path,
    language_tag: Option<&str>,
) -> ExtractResult<String> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "media".to_string());

    info!(
        path = %path.display(),
        size_mb = bytes.len() as f64 / (1024.0 * 1024.0),
        "Transcribing media file"
    );

    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(media_mime_type(path))
        .map_err(ExtractError::Http)?;

    let mut form = reqwest::multipart::Form::new()
        .text("model", TRANSCRIPTION_MODEL)
        .part("file", part);
    if let Some(tag) = language_tag {
        form = form.text("language", tag.to_string());
    }

    let response = http
        .post(TRANSCRIPTION_URL)
        .bearer_auth(api_key)
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ExtractError::InvalidInput(format!(
            "transcription failed (HTTP {status}): {}",
            body.chars().take(200).collect::<String>()
        )));
    }

    let parsed: TranscriptionResponse = response.json().await?;
    debug!(chars = parsed.text.len(), "Transcription finished");
    Ok(parsed.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_media_mime_type() {
        assert_eq!(media_mime_type(&PathBuf::from("a.mp3")), "audio/mpeg");
        assert_eq!(media_mime_type(&PathBuf::from("a.MOV")), "video/quicktime");
        assert_eq!(
            media_mime_type(&PathBuf::from("unknown.bin")),
            "application/octet-stream"
        );
    }
}
