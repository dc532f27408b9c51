//! Chat model clients.
//!
//! Collaborators that need a language model (planner, reranker, generator)
//! go through the `ChatModel` trait. The concrete backend is chosen once at
//! startup from configuration; Ollama's `/api/generate` endpoint is the
//! production implementation, with NDJSON streaming for the answer path.

use crate::config::{LlmConfig, LlmProvider, ModelConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(String),

    #[error("llm returned http {0}")]
    Status(u16),

    #[error("llm stream failed: {0}")]
    Stream(String),
}

/// A configured language model. `complete` returns the full response text;
/// `stream` yields text chunks as they are produced.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String, LlmError>;

    async fn stream(
        &self,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<mpsc::Receiver<Result<String, LlmError>>, LlmError>;
}

/// Select and build the model backend for one role. Providers form a closed
/// set decided at configuration load, never by string lookup at call time.
pub fn build_model(llm: &LlmConfig, role: &ModelConfig) -> Result<Arc<dyn ChatModel>> {
    match llm.provider {
        LlmProvider::Ollama => Ok(Arc::new(OllamaModel::new(
            &llm.base_url,
            role,
            Duration::from_secs(llm.request_timeout_secs),
        )?)),
    }
}

/// Sampling options forwarded to Ollama's `options` object.
#[derive(Debug, Clone, Default, Serialize)]
struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Serialize)]
struct GenerateRequestBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

pub struct OllamaModel {
    http: reqwest::Client,
    base_url: String,
    model: String,
    options: SamplingOptions,
}

impl OllamaModel {
    pub fn new(base_url: &str, role: &ModelConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build LLM HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: role.model.clone(),
            options: SamplingOptions {
                temperature: role.temperature,
                top_p: role.top_p,
                top_k: role.top_k,
                num_predict: role.max_tokens,
            },
        })
    }

    async fn send(
        &self,
        system: Option<&str>,
        prompt: &str,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let body = GenerateRequestBody {
            model: &self.model,
            prompt,
            system,
            stream,
            options: self.options.clone(),
        };

        debug!(model = %self.model, stream, prompt_len = prompt.len(), "llm request");

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Status(response.status().as_u16()));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatModel for OllamaModel {
    async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String, LlmError> {
        let response = self.send(system, prompt, false).await?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        Ok(json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .to_string())
    }

    async fn stream(
        &self,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<mpsc::Receiver<Result<String, LlmError>>, LlmError> {
        let response = self.send(system, prompt, true).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut buf: Vec<u8> = Vec::new();

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(LlmError::Stream(e.to_string()))).await;
                        return;
                    }
                };
                buf.extend_from_slice(&chunk);

                // Ollama streams one JSON object per line.
                while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    match serde_json::from_str::<GenerateChunk>(line) {
                        Ok(part) => {
                            if !part.response.is_empty()
                                && tx.send(Ok(part.response)).await.is_err()
                            {
                                return;
                            }
                            if part.done {
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(LlmError::Stream(e.to_string()))).await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
