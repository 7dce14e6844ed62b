//! Firecrawl scrape client.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{ExtractError, ExtractResult};

const API_URL: &str = "https://api.firecrawl.dev/v1/scrape";

/// Firecrawl scrape result.
#[derive(Debug, Clone, Deserialize)]
pub struct FirecrawlPage {
    pub markdown: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Final URL Firecrawl observed after redirects.
    #[serde(default)]
    pub source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    success: bool,
    #[serde(default)]
    data: Option<ScrapeData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    metadata: Option<ScrapeMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source_url: Option<String>,
}

/// Scrape one URL into Markdown via Firecrawl.
pub async fn scrape_markdown(
    http: &reqwest::Client,
    api_key: &str,
    url: &str,
) -> ExtractResult<FirecrawlPage> {
    let response = http
        .post(API_URL)
        .bearer_auth(api_key)
        .json(&json!({"url": url, "formats": ["markdown"]}))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ExtractError::InvalidInput(format!(
            "firecrawl returned HTTP {status}: {}",
            body.chars().take(200).collect::<String>()
        )));
    }

    let parsed: ScrapeResponse = response.json().await?;
    if !parsed.success {
        return Err(ExtractError::InvalidInput(format!(
            "firecrawl scrape failed: {}",
            parsed.error.unwrap_or_else(|| "unknown error".to_string())
        )));
    }

    let data = parsed.data.ok_or_else(|| {
        ExtractError::InvalidInput("firecrawl returned no data".to_string())
    })?;
    let markdown = data.markdown.unwrap_or_default();
    if markdown.trim().is_empty() {
        return Err(ExtractError::InvalidInput(
            "firecrawl returned empty markdown".to_string(),
        ));
    }

    debug!(url = %url, chars = markdown.len(), "Firecrawl scrape succeeded");
    let metadata = data.metadata;
    Ok(FirecrawlPage {
        markdown,
        title: metadata.as_ref().and_then(|m| m.title.clone()),
        description: metadata.as_ref().and_then(|m| m.description.clone()),
        source_url: metadata.and_then(|m| m.source_url),
    })
}
