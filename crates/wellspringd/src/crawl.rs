//! Page fetching for the crawl stage.
//!
//! Only the plain-HTTP fetcher ships with the daemon; rendered modes are
//! selected in configuration but require an external browser renderer (see
//! `server::build_fetcher`). Fetched bodies are capped so a pathological
//! page cannot balloon the session.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_stream::StreamExt;

/// Upper bound on a fetched page body.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// How a page is turned into markup. Parsed from configuration into a
/// closed set at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    #[default]
    Http,
    Rendered,
    RenderedImages,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("page returned http {0}")]
    Status(u16),

    #[error("failed to read body: {0}")]
    Read(String),
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one page and return its raw markup.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Headers that make the request look like an ordinary browser; some search
/// endpoints and pages refuse obvious bot traffic.
pub(crate) fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "accept",
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        "accept-language",
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert("cache-control", HeaderValue::from_static("max-age=0"));
    headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));
    headers.insert(
        "user-agent",
        HeaderValue::from_static(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36",
        ),
    );
    headers
}

pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(browser_headers())
            .build()
            .context("Failed to build crawler HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let mut stream = response.bytes_stream();
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::Read(e.to_string()))?;
            if body.len() + chunk.len() > MAX_BODY_BYTES {
                body.extend_from_slice(&chunk[..MAX_BODY_BYTES - body.len()]);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
