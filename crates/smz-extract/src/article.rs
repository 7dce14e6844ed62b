//! Article-ish text extraction from HTML.

use scraper::{Html, Selector};
use smz_models::{extract_youtube_id, VideoKind, VideoRef};

/// Extracted article fields, before normalization into `ExtractedContent`.
#[derive(Debug, Clone, Default)]
pub struct ArticleExtract {
    pub title: String,
    pub description: Option<String>,
    pub site_name: Option<String>,
    pub text: String,
    /// Embedded videos discovered in metadata and iframes.
    pub videos: Vec<VideoRef>,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn meta_content(document: &Html, names: &[&str]) -> Option<String> {
    for name in names {
        let css = format!(
            "meta[property=\"{name}\"], meta[name=\"{name}\"]"
        );
        let parsed = Selector::parse(&css);
        if let Ok(sel) = parsed {
            if let Some(el) = document.select(&sel).next() {
                if let Some(content) = el.value().attr("content") {
                    let content = content.trim();
                    if !content.is_empty() {
                        return Some(content.to_string());
                    }
                }
            }
        }
    }
    None
}

/// Extract article fields from an HTML document.
pub fn extract_article(html: &str) -> ArticleExtract {
    let document = Html::parse_document(html);

    let title = meta_content(&document, &["og:title", "twitter:title"])
        .or_else(|| {
            document
                .select(&selector("title"))
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default();

    let description = meta_content(&document, &["og:description", "description"]);
    let site_name = meta_content(&document, &["og:site_name"]);

    let text = extract_body_text(&document);
    let videos = find_embedded_videos(&document);

    ArticleExtract {
        title,
        description,
        site_name,
        text,
        videos,
    }
}

/// Collect readable text from the most article-like container.
fn extract_body_text(document: &Html) -> String {
    let block_sel = selector("p, h1, h2, h3, li, blockquote, pre");

    // Prefer semantic containers; fall back to the whole body.
    for container_css in ["article", "main", "body"] {
        let container_sel = selector(container_css);
        let Some(container) = document.select(&container_sel).next() else {
            continue;
        };

        let mut blocks: Vec<String> = Vec::new();
        for el in container.select(&block_sel) {
            // Skip boilerplate wrappers.
            let in_chrome = el.ancestors().filter_map(scraper::ElementRef::wrap).any(|a| {
                matches!(a.value().name(), "nav" | "header" | "footer" | "aside" | "script" | "style")
            });
            if in_chrome {
                continue;
            }
            let text = el
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if text.chars().count() >= 3 {
                blocks.push(text);
            }
        }

        if !blocks.is_empty() {
            return blocks.join("\n\n");
        }
    }
    String::new()
}

/// Find embedded video references (Open Graph metadata and iframes).
fn find_embedded_videos(document: &Html) -> Vec<VideoRef> {
    let mut videos: Vec<VideoRef> = Vec::new();
    let mut push = |url: String| {
        let kind = if extract_youtube_id(&url).is_ok() {
            VideoKind::Youtube
        } else {
            VideoKind::Direct
        };
        // Normalize embed URLs to watch URLs so downstream routing is uniform.
        let url = match (kind, extract_youtube_id(&url)) {
            (VideoKind::Youtube, Ok(id)) => format!("https://www.youtube.com/watch?v={id}"),
            _ => url,
        };
        if !videos.iter().any(|v| v.url == url) {
            videos.push(VideoRef { kind, url });
        }
    };

    for name in ["og:video", "og:video:url", "og:video:secure_url"] {
        let css = format!("meta[property=\"{name}\"]");
        let parsed = Selector::parse(&css);
        if let Ok(sel) = parsed {
            for el in document.select(&sel) {
                if let Some(content) = el.value().attr("content") {
                    push(content.trim().to_string());
                }
            }
        }
    }

    for el in document.select(&selector("iframe[src]")) {
        if let Some(src) = el.value().attr("src") {
            let src = src.trim();
            if extract_youtube_id(src).is_ok() {
                push(src.to_string());
            }
        }
    }

    videos
}

/// Whether extraction produced too little to be useful, or looks blocked.
pub fn looks_blocked_or_empty(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.chars().count() < 400 {
        return true;
    }
    let lowered = trimmed.to_lowercase();
    ["enable javascript", "are you a robot", "captcha", "access denied"]
        .iter()
        .any(|marker| lowered.contains(marker))
}
