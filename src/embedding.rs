//! Embedding clients.
//!
//! [`EmbeddingClient`] abstracts the external embedding service. The HTTP
//! implementation speaks the Google-style `batchEmbedContents` wire format
//! with bounded timeouts and an exponential-backoff retry ladder; the
//! [`MockEmbeddingClient`] produces deterministic feature-hashed vectors so
//! retrieval can be exercised offline and in CI.
//!
//! Retry strategy (HTTP client): 429 and 5xx responses and transport
//! errors are retried with backoff (1s, 2s, 4s, ... capped) plus a little
//! jitter; other 4xx responses fail immediately.

use std::time::Duration;

use async_trait::async_trait;
use rand::RngExt;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;

const GEMINI_EMBED_BASE: &str = "https://generativelanguage.googleapis.com";

/// An embedding backend: turns text into fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Dimensionality of every vector this client produces.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        if vectors.is_empty() {
            return Err(EmbeddingError::EmptyResponse);
        }
        Ok(vectors.swap_remove(0))
    }
}

/// HTTP client for a Gemini-style embedding endpoint.
///
/// Authentication is a `key` query parameter, matching the generation
/// adapter for the same provider family.
pub struct GeminiEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    dimension: usize,
    max_retries: u32,
}

impl GeminiEmbeddingClient {
    /// Build a client from configuration.
    ///
    /// Fails eagerly with [`EmbeddingError::MissingApiKey`] so a
    /// misconfigured KB blocks KB features only, before any query runs.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        if config.api_key.trim().is_empty() {
            return Err(EmbeddingError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_EMBED_BASE.to_string()),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            dimension: config.dimension,
            max_retries: config.max_retries,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:batchEmbedContents?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    fn request_body(&self, texts: &[String]) -> Value {
        let requests: Vec<Value> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [ { "text": text } ] },
                })
            })
            .collect();
        json!({ "requests": requests })
    }

    async fn attempt(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let response = self
            .http
            .post(self.endpoint())
            .json(&self.request_body(texts))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Http {
                status: status.as_u16(),
                message: truncate(&message, 300),
            });
        }

        let body: Value = response.json().await?;
        let Some(entries) = body.get("embeddings").and_then(Value::as_array) else {
            return Err(EmbeddingError::EmptyResponse);
        };
        if entries.len() != texts.len() {
            return Err(EmbeddingError::EmptyResponse);
        }

        entries
            .iter()
            .map(|entry| {
                entry
                    .get("values")
                    .and_then(Value::as_array)
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(Value::as_f64)
                            .map(|v| v as f32)
                            .collect::<Vec<f32>>()
                    })
                    .filter(|vector| !vector.is_empty())
                    .ok_or(EmbeddingError::EmptyResponse)
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingClient for GeminiEmbeddingClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut last_message = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_secs(1 << (attempt - 1).min(5));
                let jitter = Duration::from_millis(rand::rng().random_range(0..250));
                debug!(attempt, ?backoff, "retrying embedding request");
                tokio::time::sleep(backoff + jitter).await;
            }

            match self.attempt(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(EmbeddingError::Http { status, message })
                    if status == 429 || (500..600).contains(&status) =>
                {
                    warn!(status, "embedding service returned retryable status");
                    last_message = format!("HTTP {status}: {message}");
                }
                Err(EmbeddingError::Network(err)) => {
                    warn!(error = %err, "embedding request transport failure");
                    last_message = err.to_string();
                }
                Err(other) => return Err(other),
            }
        }

        Err(EmbeddingError::Exhausted {
            attempts: self.max_retries + 1,
            message: last_message,
        })
    }
}

/// Deterministic offline embedding client.
///
/// Each word hashes to a bucket and sign; a text's vector is the
/// normalized sum of its word features. Identical texts embed identically
/// and texts sharing vocabulary score high cosine similarity, which is
/// exactly what retrieval tests need.
pub struct MockEmbeddingClient {
    dimension: usize,
}

impl Default for MockEmbeddingClient {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MockEmbeddingClient {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "embedding dimension must be positive");
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text.to_ascii_lowercase().split_whitespace() {
            let hash = fnv1a(word.as_bytes());
            let bucket = (hash as usize) % self.dimension;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingClient for MockEmbeddingClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::retrieval::cosine_similarity;

    #[tokio::test]
    async fn mock_is_deterministic() {
        let client = MockEmbeddingClient::default();
        let texts = vec!["hello world".to_string(), "goodbye world".to_string()];
        let first = client.embed_batch(&texts).await.unwrap();
        let second = client.embed_batch(&texts).await.unwrap();
        assert_eq!(first, second);
        assert_ne!(first[0], first[1]);
    }

    #[tokio::test]
    async fn mock_shared_vocabulary_scores_higher() {
        let client = MockEmbeddingClient::default();
        let kubernetes = client
            .embed_query("kubernetes cluster migration plan")
            .await
            .unwrap();
        let related = client
            .embed_query("kubernetes migration timeline")
            .await
            .unwrap();
        let unrelated = client.embed_query("quarterly sales dinner menu").await.unwrap();

        assert!(
            cosine_similarity(&kubernetes, &related) > cosine_similarity(&kubernetes, &unrelated)
        );
    }

    #[tokio::test]
    async fn mock_vectors_are_unit_length() {
        let client = MockEmbeddingClient::default();
        let vector = client.embed_query("a few words of text").await.unwrap();
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn missing_api_key_fails_eagerly() {
        let config = EmbeddingConfig::default();
        assert!(matches!(
            GeminiEmbeddingClient::new(&config),
            Err(EmbeddingError::MissingApiKey)
        ));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo wörld, this is a long message";
        let short = truncate(text, 7);
        assert!(short.chars().count() <= 8);
    }
}
