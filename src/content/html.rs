//! Fetch-and-extract content source.
//!
//! Prefers the first `main`, `.content`, `#content`, or `.article` element and
//! falls back to the whole `body`.

use super::ContentSource;
use crate::error::PipelineError;
use crate::tabs::TabInfo;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

const MAIN_CONTENT_SELECTOR: &str = "main, .content, #content, .article";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Content source that fetches each tab's URL over HTTP.
pub struct HttpContentSource {
    client: Client,
}

impl HttpContentSource {
    pub fn new() -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Extraction(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn extract(&self, tab: &TabInfo) -> Result<String, PipelineError> {
        let response = self
            .client
            .get(&tab.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::Extraction(format!("{}: {}", tab.url, e)))?;
        let html = response
            .text()
            .await
            .map_err(|e| PipelineError::Extraction(format!("{}: {}", tab.url, e)))?;

        let text = extract_main_text(&html)?;
        debug!(tab_id = %tab.id, url = %tab.url, chars = text.chars().count(), "Extracted page text");
        Ok(text)
    }
}

/// Extract readable text from an HTML document.
pub fn extract_main_text(html: &str) -> Result<String, PipelineError> {
    let document = Html::parse_document(html);
    let main = selector(MAIN_CONTENT_SELECTOR)?;

    if let Some(element) = document.select(&main).next() {
        let text = normalize_whitespace(element.text());
        if !text.is_empty() {
            return Ok(text);
        }
    }

    let body = selector("body")?;
    Ok(document
        .select(&body)
        .next()
        .map(|element| normalize_whitespace(element.text()))
        .unwrap_or_default())
}

fn selector(css: &str) -> Result<Selector, PipelineError> {
    Selector::parse(css)
        .map_err(|e| PipelineError::Extraction(format!("Invalid selector {}: {:?}", css, e)))
}

fn normalize_whitespace<'a>(pieces: impl Iterator<Item = &'a str>) -> String {
    pieces
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
