//! Document loader (§4.8 `load` step): fetches resource content from a URL.
//!
//! HTML pages are reduced to their visible text via `scraper`; anything else
//! is treated as the plain text the server returned. YouTube URLs are
//! recognized but transcript fetching is a placeholder, since pulling
//! captions requires a collaborator (YouTube's own API) this crate doesn't
//! carry a client for.

use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};

use crate::types::{AppError, Result};

/// Timeout applied to both content fetches and chunking-url health probes.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

pub struct DocumentLoader {
    client: Client,
}

impl DocumentLoader {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("loader client config is always valid");
        Self { client }
    }

    /// Fetch `url` and return its textual content plus a content hash used
    /// to detect no-op re-loads.
    pub async fn load(&self, url: &str) -> Result<LoadedDocument> {
        if is_youtube_url(url) {
            return self.load_youtube(url).await;
        }

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::BackendUnavailable(format!("fetching {url}: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::BackendUnavailable(format!(
                "fetching {url} returned {}",
                resp.status()
            )));
        }

        let is_html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/html"));

        let body = resp.text().await.map_err(AppError::from)?;
        let content = if is_html { extract_visible_text(&body) } else { body };
        let content_hash = hash_content(&content);

        Ok(LoadedDocument { content, content_hash })
    }

    /// Probe a custom chunking-url for liveness; only the status code
    /// matters.
    pub async fn probe(&self, url: &str) -> Result<bool> {
        let resp = self.client.head(url).send().await;
        Ok(matches!(resp, Ok(r) if r.status().is_success()))
    }

    /// Delegate chunking to a `strategy=custom` collection's `chunkingUrl`
    /// (§4.2, §4.3): POST the resource text and expect
    /// `{chunks: {text, vectorSource?, metadata?}[]}` back, under the same
    /// 60s timeout as every other outbound call this client makes.
    pub async fn custom_chunk(&self, url: &str, text: &str) -> Result<Vec<CustomChunk>> {
        let resp = self
            .client
            .post(url)
            .json(&CustomChunkRequest { text })
            .send()
            .await
            .map_err(|e| AppError::BackendUnavailable(format!("custom chunking endpoint {url}: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::BackendUnavailable(format!(
                "custom chunking endpoint {url} returned {}",
                resp.status()
            )));
        }

        let parsed: CustomChunkResponse = resp.json().await.map_err(AppError::from)?;
        Ok(parsed.chunks)
    }

    async fn load_youtube(&self, url: &str) -> Result<LoadedDocument> {
        Err(AppError::Validation(format!(
            "YouTube transcript loading is not available in this deployment: {url}"
        )))
    }
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LoadedDocument {
    pub content: String,
    pub content_hash: String,
}

#[derive(serde::Serialize)]
struct CustomChunkRequest<'a> {
    text: &'a str,
}

#[derive(serde::Deserialize)]
struct CustomChunkResponse {
    chunks: Vec<CustomChunk>,
}

/// One chunk handed back by a `strategy=custom` endpoint.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CustomChunk {
    pub text: String,
    #[serde(default, rename = "vectorSource")]
    pub vector_source: Option<String>,
    #[serde(default)]
    pub metadata: Option<std::collections::HashMap<String, serde_json::Value>>,
}

fn is_youtube_url(url: &str) -> bool {
    url.contains("youtube.com/watch") || url.contains("youtu.be/")
}

/// Strip tags, scripts and styles, keeping whitespace-joined visible text.
fn extract_visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let skip_selector = Selector::parse("script, style, noscript").expect("static selector is valid");

    let skip_nodes: std::collections::HashSet<_> = document
        .select(&skip_selector)
        .flat_map(|el| el.descendants().map(|n| n.id()))
        .collect();

    let text: Vec<String> = document
        .root_element()
        .descendants()
        .filter(|node| !skip_nodes.contains(&node.id()))
        .filter_map(|node| node.value().as_text().map(|t| t.trim().to_string()))
        .filter(|t| !t.is_empty())
        .collect();

    text.join(" ")
}

/// Hash content so `load` can detect a no-op re-fetch (§4.8).
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_urls_are_recognized() {
        assert!(is_youtube_url("https://www.youtube.com/watch?v=abc123"));
        assert!(is_youtube_url("https://youtu.be/abc123"));
        assert!(!is_youtube_url("https://example.com/article"));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_content("hello"), hash_content("hello"));
        assert_ne!(hash_content("hello"), hash_content("world"));
    }

    #[test]
    fn extract_visible_text_drops_scripts_and_tags() {
        let html = "<html><body><script>var x = 1;</script><p>Hello <b>world</b></p></body></html>";
        let text = extract_visible_text(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("world"));
        assert!(!text.contains("var x"));
    }
}
