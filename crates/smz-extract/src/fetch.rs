//! HTTP fetch with redirect tracking and content sniffing.

use std::time::Duration;

use tracing::debug;

use crate::error::{ExtractError, ExtractResult};

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

/// A fetched page with its post-redirect URL.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects, as reported by the HTTP layer.
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: String,
}

/// Build the shared HTTP client used by extraction.
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .unwrap_or_default()
}

/// Fetch a page as text, following redirects.
pub async fn fetch_page(http: &reqwest::Client, url: &str) -> ExtractResult<FetchedPage> {
    let response = http.get(url).send().await?;
    let status = response.status();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    if !status.is_success() {
        return Err(ExtractError::InvalidInput(format!(
            "{url} returned HTTP {status}"
        )));
    }

    let body = response.text().await?;
    debug!(url = %url, final_url = %final_url, bytes = body.len(), "Fetched page");

    Ok(FetchedPage {
        final_url,
        content_type,
        body,
    })
}

/// Whether a response looks like an HTML document.
///
/// Used to demote an "asset" classification: a URL that sniffs as HTML is
/// not a downloadable media asset.
pub fn sniff_is_html(content_type: Option<&str>, leading_bytes: &str) -> bool {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if ct.contains("text/html") || ct.contains("application/xhtml") {
            return true;
        }
        // An explicit non-HTML type wins over byte sniffing.
        if !ct.starts_with("text/") && !ct.contains("octet-stream") {
            return false;
        }
    }

    let head = leading_bytes
        .get(..leading_bytes.len().min(512))
        .unwrap_or_default()
        .trim_start()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<head")
}
