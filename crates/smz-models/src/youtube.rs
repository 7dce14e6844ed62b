//! YouTube URL recognition and media source identifiers.

use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Errors from YouTube id extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum YoutubeIdError {
    #[error("not a YouTube URL")]
    InvalidYoutubeUrl,
    #[error("no video id in URL")]
    VideoIdNotFound,
    #[error("malformed video id")]
    InvalidVideoId,
}

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

/// Whether a URL points at a YouTube video page.
pub fn is_youtube_url(raw: &str) -> bool {
    extract_youtube_id(raw).is_ok()
}

/// Validate an 11-character YouTube video id.
fn validate_id(id: &str) -> Result<String, YoutubeIdError> {
    if id.is_empty() {
        return Err(YoutubeIdError::VideoIdNotFound);
    }
    if id.len() != 11
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(YoutubeIdError::InvalidVideoId);
    }
    Ok(id.to_string())
}

/// Extract the video id from a YouTube URL.
///
/// Supports `watch?v=`, `youtu.be/<id>`, `/embed/<id>`, `/shorts/<id>` and
/// `/live/<id>` forms.
pub fn extract_youtube_id(raw: &str) -> Result<String, YoutubeIdError> {
    let url = Url::parse(raw).map_err(|_| YoutubeIdError::InvalidYoutubeUrl)?;
    let host = url.host_str().ok_or(YoutubeIdError::InvalidYoutubeUrl)?;

    if host == "youtu.be" {
        let id = url.path().trim_matches('/');
        return validate_id(id);
    }

    if !YOUTUBE_HOSTS.contains(&host) {
        return Err(YoutubeIdError::InvalidYoutubeUrl);
    }

    // watch?v=<id>
    if let Some(v) = url
        .query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.to_string())
    {
        return validate_id(&v);
    }

    // /embed/<id>, /shorts/<id>, /live/<id>
    let segments: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() >= 2 && matches!(segments[0], "embed" | "shorts" | "live" | "v") {
        return validate_id(segments[1]);
    }

    Err(YoutubeIdError::VideoIdNotFound)
}

/// Stable identifier for a media source.
///
/// YouTube sources use the video id; direct media uses `<slug>-<shortHash>`,
/// where the slug comes from the final path segment and the hash pins the
/// exact URL.
pub fn media_source_id(url: &str) -> String {
    if let Ok(id) = extract_youtube_id(url) {
        return id;
    }

    let slug = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segs| segs.filter(|s| !s.is_empty()).last().map(|s| s.to_string()))
        })
        .map(|seg| {
            let stem = seg.rsplit_once('.').map(|(s, _)| s.to_string()).unwrap_or(seg);
            stem.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        c.to_ascii_lowercase()
                    } else {
                        '-'
                    }
                })
                .collect::<String>()
                .trim_matches('-')
                .to_string()
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "media".to_string());

    let digest = Sha256::digest(url.trim().as_bytes());
    let short = format!("{:x}", digest);
    format!("{}-{}", slug, &short[..10])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_watch_url() {
        assert_eq!(
            extract_youtube_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Ok("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_youtube_id("https://youtube.com/watch?v=dQw4w9WgXcQ&list=x"),
            Ok("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_extract_short_forms() {
        assert_eq!(
            extract_youtube_id("https://youtu.be/dQw4w9WgXcQ"),
            Ok("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_youtube_id("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            Ok("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_youtube_id("https://www.youtube.com/shorts/dQw4w9WgXcQ"),
            Ok("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_extract_rejections() {
        assert_eq!(
            extract_youtube_id("https://example.com/watch?v=dQw4w9WgXcQ"),
            Err(YoutubeIdError::InvalidYoutubeUrl)
        );
        assert_eq!(
            extract_youtube_id("https://www.youtube.com/watch"),
            Err(YoutubeIdError::VideoIdNotFound)
        );
        assert_eq!(
            extract_youtube_id("https://www.youtube.com/watch?v=short"),
            Err(YoutubeIdError::InvalidVideoId)
        );
    }

    #[test]
    fn test_media_source_id_for_youtube() {
        assert_eq!(
            media_source_id("https://youtu.be/dQw4w9WgXcQ"),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_media_source_id_slug_hash() {
        let id = media_source_id("https://cdn.example.com/talks/Keynote%20Final.mp4");
        let (slug, hash) = id.rsplit_once('-').unwrap();
        assert!(!slug.is_empty());
        assert_eq!(hash.len(), 10);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        // Stable across calls
        assert_eq!(id, media_source_id("https://cdn.example.com/talks/Keynote%20Final.mp4"));
    }
}
