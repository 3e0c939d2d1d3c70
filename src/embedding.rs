//! Embedding providers for the `hrx` binary.
//!
//! Implements the core [`Embedder`] trait over the OpenAI embeddings API and
//! selects a provider from configuration:
//! - **`hashing`**: the core crate's deterministic [`HashingEmbedder`]; no network.
//! - **`openai`**: [`OpenAiEmbedder`], `POST /v1/embeddings`.
//!
//! # Error Mapping
//!
//! Each [`Embedder::embed`] call is a single HTTP attempt. Retries and
//! backoff are applied by the core pipeline's `RetryPolicy`, driven by the
//! error kind:
//! - HTTP 429 → `RateLimited` (retried)
//! - HTTP 5xx and network errors → `Unavailable` (retried)
//! - other HTTP 4xx and malformed responses → `Rejected` (not retried)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use hr_harness_core::embedding::{Embedder, HashingEmbedder};
use hr_harness_core::error::EmbeddingError;

use crate::config::{EmbeddingConfig, DEFAULT_HASHING_DIMS};

const OPENAI_URL: &str = "https://api.openai.com";

/// Build the embedder named by `embedding.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(
            HashingEmbedder::new(config.dims.unwrap_or(DEFAULT_HASHING_DIMS))
                .with_batch_limit(config.batch_size),
        )),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embedding provider using the OpenAI API.
///
/// Requires the `OPENAI_API_KEY` environment variable. `embedding.url`
/// overrides the API base URL (for proxies and compatible servers).
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    dims: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .context("embedding.model required for OpenAI provider")?;
        let dims = config
            .dims
            .context("embedding.dims required for OpenAI provider")?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;
        let base = config.url.as_deref().unwrap_or(OPENAI_URL).trim_end_matches('/');

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/v1/embeddings", base),
            model,
            dims,
            batch_size: config.batch_size,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn max_batch_size(&self) -> Option<usize> {
        Some(self.batch_size)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;
            return parse_openai_response(&json);
        }

        let body_text = response.text().await.unwrap_or_default();
        let message = format!("OpenAI API error {}: {}", status, body_text);
        Err(classify_status(status.as_u16(), message))
    }
}

fn classify_status(status: u16, message: String) -> EmbeddingError {
    match status {
        429 => EmbeddingError::RateLimited(message),
        500..=599 => EmbeddingError::Unavailable(message),
        _ => EmbeddingError::Rejected(message),
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Returns the `data[].embedding` arrays ordered by their `index` field.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbeddingError::Rejected("invalid response: missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbeddingError::Rejected("invalid response: missing embedding".into()))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let vec = embedding
            .iter()
            .map(|v| {
                v.as_f64().map(|f| f as f32).ok_or_else(|| {
                    EmbeddingError::Rejected(format!("invalid response: non-numeric component {v}"))
                })
            })
            .collect::<Result<Vec<f32>, _>>()?;
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
