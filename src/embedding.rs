//! Embedding collaborator.
//!
//! [`Embedder`] is the capability handle the indexer and retriever depend
//! on; tests substitute fakes. [`HttpEmbedder`] calls an OpenAI-compatible
//! embeddings endpoint with batching, retry, and exponential backoff.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Text batch → fixed-dimension vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let results = embedder.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| Error::embedding("empty embedding response"))
}

/// OpenAI-compatible embeddings client.
///
/// Reads the API key from `OPENAI_API_KEY`; an unset key simply omits the
/// Authorization header, which suits keyless local endpoints.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
        })
    }

    async fn request_once(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, Error> {
        let body = serde_json::json!({
            "model": self.config.model,
            "input": texts,
        });

        let mut req = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req.send().await?;
        let status = response.status();

        if status.is_success() {
            let json: serde_json::Value = response.json().await?;
            return parse_embedding_response(&json);
        }

        let body_text = response.text().await.unwrap_or_default();
        Err(Error::embedding(format!(
            "embeddings API error {}: {}",
            status, body_text
        )))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.request_once(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) => {
                    if !is_retryable(&err) {
                        return Err(err);
                    }
                    tracing::warn!("Embedding request failed (attempt {}): {}", attempt + 1, err);
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::embedding("embedding failed after retries")))
    }

    fn dims(&self) -> usize {
        self.config.dims
    }
}

fn is_retryable(err: &Error) -> bool {
    match err {
        Error::Http(_) => true,
        Error::Embedding(msg) => {
            msg.contains("429") || msg.contains("API error 5")
        }
        _ => false,
    }
}

/// Extract the `data[].embedding` arrays in order.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::embedding("invalid response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::embedding("invalid response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}
