//! The extraction strategy pipeline.
//!
//! Routing: YouTube URLs resolve transcripts, direct media URLs download
//! and transcribe, everything else is fetched as HTML with optional
//! Firecrawl and LLM-Markdown upgrades. Strategy failures accumulate as
//! diagnostics; only producing nothing at all is fatal.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smz_cache::{MediaCache, MetaStore, Namespace};
use smz_llm::{GenerateRequest, LlmClient};
use smz_models::{
    classify_url_kind, extract_youtube_id, transcript_key, CallPurpose, CostBook,
    ExtractedContent, TranscriptInfo, UrlKind, VideoKind, VideoRef,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::article::{extract_article, looks_blocked_or_empty};
use crate::error::{ExtractError, ExtractResult};
use crate::fetch::{build_http_client, fetch_page, sniff_is_html};
use crate::firecrawl::scrape_markdown;
use crate::media::transcribe_media;
use crate::retry::{retry_async, RetryConfig};
use crate::youtube::resolve_transcript;

/// Firecrawl usage mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FirecrawlMode {
    Off,
    #[default]
    Auto,
    Always,
}

impl FromStr for FirecrawlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(FirecrawlMode::Off),
            "auto" => Ok(FirecrawlMode::Auto),
            "always" => Ok(FirecrawlMode::Always),
            other => Err(format!("unknown firecrawl mode '{other}'")),
        }
    }
}

/// Markdown conversion mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkdownMode {
    #[default]
    Off,
    Auto,
    Llm,
}

impl FromStr for MarkdownMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(MarkdownMode::Off),
            "auto" => Ok(MarkdownMode::Auto),
            "llm" => Ok(MarkdownMode::Llm),
            other => Err(format!("unknown markdown mode '{other}'")),
        }
    }
}

/// Extraction settings for one run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub firecrawl: FirecrawlMode,
    pub markdown: MarkdownMode,
    pub timeout: Duration,
    pub max_characters: usize,
    /// Language tag forwarded to transcription.
    pub language_tag: Option<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            firecrawl: FirecrawlMode::Auto,
            markdown: MarkdownMode::Off,
            timeout: Duration::from_secs(30),
            max_characters: 80_000,
            language_tag: None,
        }
    }
}

/// Cached transcript row.
#[derive(Debug, Serialize, Deserialize)]
struct CachedTranscript {
    source: String,
    text: String,
}

/// The extractor. Holds external collaborators by reference; no globals.
pub struct Extractor<'a> {
    http: reqwest::Client,
    options: ExtractOptions,
    firecrawl_key: Option<String>,
    apify_token: Option<String>,
    transcription_key: Option<String>,
    transcript_cache: Option<&'a MetaStore>,
    media_cache: Option<&'a MediaCache>,
    /// Client used for LLM Markdown conversion; the run's current model.
    markdown_llm: Option<&'a dyn LlmClient>,
}

impl<'a> Extractor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        options: ExtractOptions,
        firecrawl_key: Option<String>,
        apify_token: Option<String>,
        transcription_key: Option<String>,
        transcript_cache: Option<&'a MetaStore>,
        media_cache: Option<&'a MediaCache>,
        markdown_llm: Option<&'a dyn LlmClient>,
    ) -> Self {
        Self {
            http: build_http_client(options.timeout),
            options,
            firecrawl_key,
            apify_token,
            transcription_key,
            transcript_cache,
            media_cache,
            markdown_llm,
        }
    }

    /// Extract content for one URL.
    pub async fn extract(&self, url: &str, book: &mut CostBook) -> ExtractResult<ExtractedContent> {
        if let Ok(video_id) = extract_youtube_id(url) {
            return self.extract_youtube(url, &video_id, book).await;
        }

        let parsed =
            Url::parse(url).map_err(|_| ExtractError::InvalidInput(format!("bad URL: {url}")))?;
        match classify_url_kind(&parsed) {
            UrlKind::Asset => self.extract_media(url, book).await,
            UrlKind::Website => self.extract_website(url, book).await,
        }
    }

    /// Extract a local file: text files read directly, media files go
    /// through transcription with an mtime-keyed transcript cache row.
    pub async fn extract_local_file(
        &self,
        path: &std::path::Path,
        book: &mut CostBook,
    ) -> ExtractResult<ExtractedContent> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ExtractError::InvalidInput(format!("file not found: {} ({e})", path.display()))
        })?;
        let url = format!("file://{}", path.display());
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        if let Ok(text) = String::from_utf8(bytes) {
            let (content, truncated) = truncate(&text, self.options.max_characters);
            let word_count = ExtractedContent::word_count_of(&content);
            return Ok(ExtractedContent {
                url,
                title,
                description: None,
                site_name: None,
                total_characters: content.chars().count(),
                word_count,
                content,
                truncated,
                transcript: None,
                video: None,
                is_video_only: false,
                diagnostics: Vec::new(),
            });
        }

        // Binary: only media files are usable, via transcription.
        let key = self.transcription_key.as_deref().ok_or_else(|| {
            ExtractError::InvalidInput(
                "binary file transcription requires OPENAI_API_KEY".to_string(),
            )
        })?;
        let mtime_ms = tokio::fs::metadata(path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64);
        let cache_key = transcript_key(&url, "media", mtime_ms);

        let cached = self
            .transcript_cache
            .and_then(|store| store.get(Namespace::Transcript, &cache_key).ok().flatten());
        let text = match cached {
            Some(text) => {
                debug!(path = %path.display(), "Local media transcript cache hit");
                text
            }
            None => {
                book.record_service("transcription");
                let text = transcribe_media(
                    &self.http,
                    key,
                    path,
                    self.options.language_tag.as_deref(),
                )
                .await?;
                if let Some(store) = self.transcript_cache {
                    if let Err(e) = store.put(Namespace::Transcript, &cache_key, &text) {
                        warn!(error = %e, "Failed to cache local transcript");
                    }
                }
                text
            }
        };

        let (content, truncated) = truncate(&text, self.options.max_characters);
        let word_count = ExtractedContent::word_count_of(&content);
        Ok(ExtractedContent {
            url,
            title,
            description: None,
            site_name: None,
            total_characters: content.chars().count(),
            word_count,
            transcript: Some(TranscriptInfo {
                source: "transcription".to_string(),
                chars: text.chars().count(),
                word_count: ExtractedContent::word_count_of(&text),
                metadata: None,
            }),
            content,
            truncated,
            video: None,
            is_video_only: false,
            diagnostics: Vec::new(),
        })
    }

    // ---- YouTube -----------------------------------------------------------

    async fn extract_youtube(
        &self,
        url: &str,
        video_id: &str,
        book: &mut CostBook,
    ) -> ExtractResult<ExtractedContent> {
        let mut diagnostics = Vec::new();
        let cache_key = transcript_key(url, "yt:auto", None);

        let cached: Option<CachedTranscript> = self
            .transcript_cache
            .and_then(|store| store.get(Namespace::Transcript, &cache_key).ok().flatten())
            .and_then(|raw| serde_json::from_str(&raw).ok());

        let transcript = match cached {
            Some(hit) => {
                debug!(video_id, "Transcript cache hit");
                crate::youtube::Transcript {
                    source: hit.source,
                    text: hit.text,
                }
            }
            None => {
                let resolved = resolve_transcript(
                    &self.http,
                    video_id,
                    self.apify_token.as_deref(),
                    &mut diagnostics,
                )
                .await?;
                let Some(resolved) = resolved else {
                    return Err(ExtractError::NoContent {
                        url: url.to_string(),
                        diagnostics,
                    });
                };
                if resolved.source == "actor" {
                    book.record_service("apify-transcript");
                }
                if let Some(store) = self.transcript_cache {
                    let row = CachedTranscript {
                        source: resolved.source.clone(),
                        text: resolved.text.clone(),
                    };
                    if let Err(e) =
                        store.put(Namespace::Transcript, &cache_key, &serde_json::to_string(&row)?)
                    {
                        warn!(error = %e, "Failed to cache transcript");
                    }
                }
                resolved
            }
        };

        let title = self
            .fetch_youtube_title(url)
            .await
            .unwrap_or_else(|| format!("YouTube video {video_id}"));

        let (content, truncated) = truncate(&transcript.text, self.options.max_characters);
        let word_count = ExtractedContent::word_count_of(&content);
        Ok(ExtractedContent {
            url: url.to_string(),
            title,
            description: None,
            site_name: Some("YouTube".to_string()),
            total_characters: content.chars().count(),
            word_count,
            transcript: Some(TranscriptInfo {
                source: transcript.source,
                chars: transcript.text.chars().count(),
                word_count: ExtractedContent::word_count_of(&transcript.text),
                metadata: None,
            }),
            content,
            truncated,
            video: Some(VideoRef {
                kind: VideoKind::Youtube,
                url: url.to_string(),
            }),
            is_video_only: false,
            diagnostics,
        })
    }

    async fn fetch_youtube_title(&self, url: &str) -> Option<String> {
        let oembed = format!(
            "https://www.youtube.com/oembed?url={}&format=json",
            urlencode(url)
        );
        let value: serde_json::Value = self.http.get(&oembed).send().await.ok()?.json().await.ok()?;
        value["title"].as_str().map(|s| s.to_string())
    }

    // ---- Direct media ------------------------------------------------------

    async fn extract_media(&self, url: &str, book: &mut CostBook) -> ExtractResult<ExtractedContent> {
        let mut diagnostics = Vec::new();
        let key = self
            .transcription_key
            .as_deref()
            .ok_or_else(|| {
                ExtractError::InvalidInput(
                    "media transcription requires OPENAI_API_KEY".to_string(),
                )
            })?;

        // Cache first; on miss, download and hand the payload to the cache.
        let cached_path = match self.media_cache {
            Some(cache) => cache.get(url).await?,
            None => None,
        };

        let (path, _temp_guard) = match cached_path {
            Some(path) => {
                debug!(url = %url, "Media cache hit");
                (path, None)
            }
            None => {
                let temp = tempfile::TempDir::new()?;
                let downloaded = self.download_media(url, temp.path()).await?;
                let stored = match self.media_cache {
                    Some(cache) => cache.put(url, &downloaded, None, None).await?,
                    None => None,
                };
                match stored {
                    Some(path) => (path, None),
                    // Not cacheable (too big / cache off): keep the temp file
                    // alive for the transcription call.
                    None => (downloaded, Some(temp)),
                }
            }
        };

        book.record_service("transcription");
        let text = transcribe_media(
            &self.http,
            key,
            &path,
            self.options.language_tag.as_deref(),
        )
        .await?;
        if text.trim().is_empty() {
            diagnostics.push("transcription: empty result".to_string());
            return Err(ExtractError::NoContent {
                url: url.to_string(),
                diagnostics,
            });
        }

        let title = Url::parse(url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|s| s.filter(|p| !p.is_empty()).last().map(String::from))
            })
            .unwrap_or_else(|| url.to_string());

        let (content, truncated) = truncate(&text, self.options.max_characters);
        let word_count = ExtractedContent::word_count_of(&content);
        Ok(ExtractedContent {
            url: url.to_string(),
            title,
            description: None,
            site_name: None,
            total_characters: content.chars().count(),
            word_count,
            transcript: Some(TranscriptInfo {
                source: "transcription".to_string(),
                chars: text.chars().count(),
                word_count: ExtractedContent::word_count_of(&text),
                metadata: None,
            }),
            content,
            truncated,
            video: Some(VideoRef {
                kind: VideoKind::Direct,
                url: url.to_string(),
            }),
            is_video_only: false,
            diagnostics,
        })
    }

    /// Download a media asset into `dir`, refusing HTML responses.
    async fn download_media(&self, url: &str, dir: &std::path::Path) -> ExtractResult<std::path::PathBuf> {
        let retry = RetryConfig::new("media download");
        let (content_type, bytes) = retry_async(&retry, || async {
            let response = self.http.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ExtractError::InvalidInput(format!(
                    "{url} returned HTTP {status}"
                )));
            }
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let bytes = response.bytes().await?;
            Ok::<_, ExtractError>((content_type, bytes))
        })
        .await?;
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_string();
        if sniff_is_html(content_type.as_deref(), &head) {
            return Err(ExtractError::AssetIsHtml(url.to_string()));
        }

        let name = Url::parse(url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|s| s.filter(|p| !p.is_empty()).last().map(String::from))
            })
            .unwrap_or_else(|| "media.bin".to_string());
        let path = dir.join(name);
        tokio::fs::write(&path, &bytes).await?;
        info!(url = %url, bytes = bytes.len(), "Downloaded media asset");
        Ok(path)
    }

    // ---- Websites ----------------------------------------------------------

    async fn extract_website(
        &self,
        url: &str,
        book: &mut CostBook,
    ) -> ExtractResult<ExtractedContent> {
        let mut diagnostics = Vec::new();

        // Firecrawl-first when the mode demands it.
        if self.options.firecrawl == FirecrawlMode::Always {
            match self.try_firecrawl(url, book, &mut diagnostics).await {
                Some(content) => return Ok(content),
                None => debug!(url = %url, "Firecrawl-always failed, falling back to HTML"),
            }
        }

        let page = fetch_page(&self.http, url).await?;
        let article = extract_article(&page.body);
        let mut text = article.text.clone();
        let low_quality = looks_blocked_or_empty(&text);

        if low_quality && self.options.firecrawl == FirecrawlMode::Auto {
            if let Some(content) = self.try_firecrawl(url, book, &mut diagnostics).await {
                return Ok(content);
            }
        }

        // Video-only page: no article text, exactly one embedded video.
        if text.trim().is_empty() {
            let youtube: Vec<&VideoRef> = article
                .videos
                .iter()
                .filter(|v| v.kind == VideoKind::Youtube)
                .collect();
            if youtube.len() == 1 {
                diagnostics.push("no article text; page embeds a single video".to_string());
                return Ok(ExtractedContent {
                    url: page.final_url,
                    title: article.title,
                    description: article.description,
                    site_name: article.site_name,
                    content: String::new(),
                    truncated: false,
                    total_characters: 0,
                    word_count: 0,
                    transcript: None,
                    video: Some(youtube[0].clone()),
                    is_video_only: true,
                    diagnostics,
                });
            }
            return Err(ExtractError::NoContent {
                url: page.final_url,
                diagnostics,
            });
        }

        // LLM Markdown conversion: explicit, or auto on low-quality HTML.
        let wants_llm_markdown = self.options.markdown == MarkdownMode::Llm
            || (self.options.markdown == MarkdownMode::Auto && low_quality);
        if wants_llm_markdown {
            match self.llm_markdown(&text, book).await {
                Ok(markdown) => text = markdown,
                Err(e) => diagnostics.push(format!("markdown: {e}")),
            }
        }

        let (content, truncated) = truncate(&text, self.options.max_characters);
        let word_count = ExtractedContent::word_count_of(&content);
        Ok(ExtractedContent {
            url: page.final_url,
            title: article.title,
            description: article.description,
            site_name: article.site_name,
            total_characters: content.chars().count(),
            word_count,
            content,
            truncated,
            transcript: None,
            video: article.videos.first().cloned(),
            is_video_only: false,
            diagnostics,
        })
    }

    async fn try_firecrawl(
        &self,
        url: &str,
        book: &mut CostBook,
        diagnostics: &mut Vec<String>,
    ) -> Option<ExtractedContent> {
        let Some(key) = self.firecrawl_key.as_deref() else {
            diagnostics.push("firecrawl: no API key".to_string());
            return None;
        };

        book.record_service("firecrawl");
        match scrape_markdown(&self.http, key, url).await {
            Ok(scraped) => {
                let (content, truncated) = truncate(&scraped.markdown, self.options.max_characters);
                let word_count = ExtractedContent::word_count_of(&content);
                Some(ExtractedContent {
                    url: scraped.source_url.unwrap_or_else(|| url.to_string()),
                    title: scraped.title.unwrap_or_default(),
                    description: scraped.description,
                    site_name: None,
                    total_characters: content.chars().count(),
                    word_count,
                    content,
                    truncated,
                    transcript: None,
                    video: None,
                    is_video_only: false,
                    diagnostics: std::mem::take(diagnostics),
                })
            }
            Err(e) => {
                diagnostics.push(format!("firecrawl: {e}"));
                None
            }
        }
    }

    async fn llm_markdown(&self, text: &str, book: &mut CostBook) -> ExtractResult<String> {
        let client = self.markdown_llm.ok_or_else(|| {
            ExtractError::InvalidInput("markdown=llm requires a configured model".to_string())
        })?;

        let prompt = format!(
            "Convert the following extracted web page text into clean Markdown. \
             Preserve headings, lists and emphasis; drop navigation or boilerplate. \
             Output only the Markdown.\n\n{text}"
        );
        let request = GenerateRequest::new(prompt).with_timeout(self.options.timeout);
        let generated = client.generate(&request).await?;
        book.record_call(
            client.model().clone(),
            generated.usage,
            CallPurpose::Markdown,
        );
        if generated.text.trim().is_empty() {
            return Err(ExtractError::InvalidInput(
                "markdown conversion returned nothing".to_string(),
            ));
        }
        Ok(generated.text)
    }
}

/// Truncate to a character budget on a whitespace boundary.
fn truncate(text: &str, max_characters: usize) -> (String, bool) {
    let count = text.chars().count();
    if count <= max_characters {
        return (text.to_string(), false);
    }
    let cut: String = text.chars().take(max_characters).collect();
    let trimmed = match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > max_characters / 2 => cut[..idx].to_string(),
        _ => cut,
    };
    (trimmed, true)
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() * 3);
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_budget() {
        let (text, truncated) = truncate("short text", 100);
        assert_eq!(text, "short text");
        assert!(!truncated);

        let long = "word ".repeat(100);
        let (text, truncated) = truncate(&long, 50);
        assert!(truncated);
        assert!(text.chars().count() <= 50);
        // Cut lands on a word boundary.
        assert!(!text.ends_with(' '));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("auto".parse::<FirecrawlMode>(), Ok(FirecrawlMode::Auto));
        assert_eq!("ALWAYS".parse::<FirecrawlMode>(), Ok(FirecrawlMode::Always));
        assert!("sometimes".parse::<FirecrawlMode>().is_err());

        assert_eq!("llm".parse::<MarkdownMode>(), Ok(MarkdownMode::Llm));
        assert_eq!("off".parse::<MarkdownMode>(), Ok(MarkdownMode::Off));
    }

    #[test]
    fn test_urlencode() {
        assert_eq!(
            urlencode("https://youtu.be/a?b=c"),
            "https%3A%2F%2Fyoutu.be%2Fa%3Fb%3Dc"
        );
    }
}
