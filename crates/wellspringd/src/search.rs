//! SearXNG search backend client.
//!
//! Queries a SearXNG instance's HTML interface and scrapes the result list.
//! An empty result page counts as a failure so the caller can mark that
//! sub-query as failed instead of crawling nothing.

use crate::crawl::browser_headers;
use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use wellspring_common::SearchResult;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("invalid endpoint url: {0}")]
    InvalidEndpoint(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("search returned http {0}")]
    Status(u16),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("no results found")]
    NoResults,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, endpoint: &str, query: &str)
        -> Result<Vec<SearchResult>, SearchError>;
}

pub struct SearxClient {
    http: reqwest::Client,
    engines: Vec<String>,
}

impl SearxClient {
    pub fn new(engines: Vec<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(browser_headers())
            .build()
            .context("Failed to build search HTTP client")?;
        Ok(Self { http, engines })
    }
}

#[async_trait]
impl SearchBackend for SearxClient {
    async fn search(
        &self,
        endpoint: &str,
        query: &str,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let mut url = reqwest::Url::parse(endpoint)
            .map_err(|e| SearchError::InvalidEndpoint(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("engines", &self.engines.join(","));

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        let results = parse_results(&html)?;
        if results.is_empty() {
            return Err(SearchError::NoResults);
        }
        Ok(results)
    }
}

/// Scrape the SearXNG result page.
pub fn parse_results(html: &str) -> Result<Vec<SearchResult>, SearchError> {
    let selector = |s: &str| Selector::parse(s).map_err(|e| SearchError::Parse(e.to_string()));

    let result_sel = selector("article.result")?;
    let title_sel = selector("h3 a")?;
    let url_sel = selector("a.url_wrapper")?;
    let content_sel = selector("p.content")?;
    let engines_sel = selector("div.engines > span")?;

    let document = Html::parse_document(html);
    let mut results = Vec::new();

    for article in document.select(&result_sel) {
        let title = article
            .select(&title_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let url = article
            .select(&url_sel)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(|href| href.trim().to_string())
            .unwrap_or_default();

        let content = article
            .select(&content_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let engines = article
            .select(&engines_sel)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .collect();

        results.push(SearchResult {
            title,
            url,
            content,
            engines,
        });
    }

    Ok(results)
}
