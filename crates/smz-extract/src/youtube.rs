//! YouTube transcript resolution.
//!
//! Strategy order: the platform timedtext API, then caption tracks parsed
//! out of the watch page, then (when a token is available) the external
//! transcript actor. The first non-empty transcript wins.

use serde_json::Value;
use tracing::debug;

use crate::error::{ExtractError, ExtractResult};

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const TIMEDTEXT_URL: &str = "https://www.youtube.com/api/timedtext";
const APIFY_RUN_URL: &str =
    "https://api.apify.com/v2/acts/topaz_sharingan~youtube-transcript-scraper/run-sync-get-dataset-items";

/// A resolved transcript with its source label.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// `timedtext`, `captions`, or `actor`.
    pub source: String,
    pub text: String,
}

/// Parse a `json3` timedtext payload into plain text.
pub fn parse_json3_transcript(value: &Value) -> Option<String> {
    let events = value["events"].as_array()?;
    let mut lines: Vec<String> = Vec::new();
    for event in events {
        let Some(segs) = event["segs"].as_array() else {
            continue;
        };
        let line: String = segs
            .iter()
            .filter_map(|seg| seg["utf8"].as_str())
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if !line.is_empty() {
            lines.push(line);
        }
    }
    let text = lines.join("\n");
    (!text.trim().is_empty()).then_some(text)
}

/// Pull caption track URLs out of a watch-page HTML blob.
///
/// The player config embeds `"captionTracks":[{"baseUrl":"..."},...]`; the
/// first track (preferring non-ASR) is used.
pub fn parse_caption_track_url(watch_html: &str) -> Option<String> {
    let start = watch_html.find("\"captionTracks\":")? + "\"captionTracks\":".len();
    let rest = &watch_html[start..];
    let end = rest.find(']')? + 1;
    let tracks: Value = serde_json::from_str(&rest[..end]).ok()?;
    let tracks = tracks.as_array()?;

    let pick = tracks
        .iter()
        .find(|t| t["kind"].as_str() != Some("asr"))
        .or_else(|| tracks.first())?;
    let base = pick["baseUrl"].as_str()?;
    Some(base.replace("\\u0026", "&"))
}

async fn fetch_timedtext(
    http: &reqwest::Client,
    video_id: &str,
) -> ExtractResult<Option<String>> {
    let url = format!("{TIMEDTEXT_URL}?v={video_id}&lang=en&fmt=json3");
    let response = http.get(&url).send().await?;
    if !response.status().is_success() {
        return Ok(None);
    }
    let body = response.text().await?;
    if body.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    Ok(parse_json3_transcript(&value))
}

async fn fetch_caption_tracks(
    http: &reqwest::Client,
    video_id: &str,
) -> ExtractResult<Option<String>> {
    let watch = http
        .get(format!("{WATCH_URL}{video_id}"))
        .send()
        .await?
        .text()
        .await?;

    let Some(track_url) = parse_caption_track_url(&watch) else {
        return Ok(None);
    };
    let track_url = if track_url.contains("fmt=") {
        track_url
    } else {
        format!("{track_url}&fmt=json3")
    };

    let body = http.get(&track_url).send().await?.text().await?;
    let value: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    Ok(parse_json3_transcript(&value))
}

async fn fetch_actor_transcript(
    http: &reqwest::Client,
    token: &str,
    video_url: &str,
) -> ExtractResult<Option<String>> {
    let response = http
        .post(format!("{APIFY_RUN_URL}?token={token}"))
        .json(&serde_json::json!({"videoUrl": video_url}))
        .send()
        .await?;
    if !response.status().is_success() {
        return Ok(None);
    }
    let items: Value = response.json().await?;
    let text = items[0]["transcript"]
        .as_str()
        .or_else(|| items[0]["text"].as_str())
        .unwrap_or_default()
        .to_string();
    Ok((!text.trim().is_empty()).then_some(text))
}

/// Resolve a transcript for a YouTube video.
///
/// `diagnostics` accumulates per-strategy failures; they are not fatal.
pub async fn resolve_transcript(
    http: &reqwest::Client,
    video_id: &str,
    apify_token: Option<&str>,
    diagnostics: &mut Vec<String>,
) -> ExtractResult<Option<Transcript>> {
    match fetch_timedtext(http, video_id).await {
        Ok(Some(text)) => {
            debug!(video_id, "Transcript via timedtext API");
            return Ok(Some(Transcript {
                source: "timedtext".to_string(),
                text,
            }));
        }
        Ok(None) => diagnostics.push("timedtext: no transcript".to_string()),
        Err(e) => diagnostics.push(format!("timedtext: {e}")),
    }

    match fetch_caption_tracks(http, video_id).await {
        Ok(Some(text)) => {
            debug!(video_id, "Transcript via caption tracks");
            return Ok(Some(Transcript {
                source: "captions".to_string(),
                text,
            }));
        }
        Ok(None) => diagnostics.push("captions: no tracks".to_string()),
        Err(e) => diagnostics.push(format!("captions: {e}")),
    }

    if let Some(token) = apify_token {
        let video_url = format!("{WATCH_URL}{video_id}");
        match fetch_actor_transcript(http, token, &video_url).await {
            Ok(Some(text)) => {
                debug!(video_id, "Transcript via external actor");
                return Ok(Some(Transcript {
                    source: "actor".to_string(),
                    text,
                }));
            }
            Ok(None) => diagnostics.push("actor: empty result".to_string()),
            Err(e) => diagnostics.push(format!("actor: {e}")),
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json3_transcript() {
        let value = json!({"events": [
            {"segs": [{"utf8": "Transcript: "}, {"utf8": "hello"}]},
            {"tStartMs": 100},
            {"segs": [{"utf8": "second line"}]}
        ]});
        assert_eq!(
            parse_json3_transcript(&value).as_deref(),
            Some("Transcript: hello\nsecond line")
        );
    }

    #[test]
    fn test_parse_json3_empty() {
        assert_eq!(parse_json3_transcript(&json!({"events": []})), None);
        assert_eq!(parse_json3_transcript(&json!({})), None);
    }

    #[test]
    fn test_parse_caption_track_url() {
        let html = r#"..."captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https://www.youtube.com/api/timedtext?v=abc&lang=en","kind":"asr"},{"baseUrl":"https://www.youtube.com/api/timedtext?v=abc&lang=en&name=manual"}]}}..."#;
        let url = parse_caption_track_url(html).unwrap();
        // Prefers the non-ASR track.
        assert!(url.contains("name=manual"));
        assert!(url.contains('&'));
        assert!(!url.contains("\\u0026"));
    }

    #[test]
    fn test_parse_caption_track_url_missing() {
        assert_eq!(parse_caption_track_url("<html>no captions</html>"), None);
    }
}
