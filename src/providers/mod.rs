//! Multi-provider LLM adapter.
//!
//! One provider-agnostic [`GenerationRequest`] is translated into a
//! backend's wire shape by a [`ProviderAdapter`]: where the credentials
//! go (header vs query parameter), what the role vocabulary is, what the
//! token-limit and JSON-mode fields are called, and how a rate-limit
//! backoff is communicated. [`ProviderClient`] owns the HTTP call and the
//! normalization back into a tagged [`ModelReply`]: silence is a value,
//! not a magic string compared at call sites.
//!
//! Adding a backend means adding one adapter; nothing else changes.

pub mod gemini;
pub mod openai;

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::{ProviderConfig, ProviderKind};
use crate::coordinator::ConversationTurn;
use crate::error::ProviderError;

pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

/// Backoff applied when a 429 carries no parsable retry hint.
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(30);

/// Provider-agnostic generation envelope.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    /// Conversation turns, oldest first. The current utterance is the
    /// final user turn.
    pub turns: Vec<ConversationTurn>,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Request structured (JSON) output via the backend's own mechanism.
    pub json_mode: bool,
}

/// A fully materialized outbound request.
#[derive(Clone, Debug)]
pub struct WireRequest {
    pub url: String,
    /// Extra headers beyond `Content-Type: application/json`; credentials
    /// live here for header-auth backends and in `url` for the rest.
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Translation seam between the envelope and one backend's wire protocol.
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build the outbound request for this backend.
    fn build_request(&self, request: &GenerationRequest) -> WireRequest;

    /// Pull the completion text out of a success-response body.
    fn extract_text(&self, body: &Value) -> Result<String, ProviderError>;

    /// Parse the backend's backoff hint from a 429 response, if present.
    fn parse_backoff(&self, headers: &HeaderMap, body: &Value) -> Option<Duration>;
}

/// The model's normalized answer: it either spoke or chose not to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelReply {
    Spoke(String),
    Silence,
}

impl ModelReply {
    /// Classify raw completion text, folding the silence marker and its
    /// documented variants into [`ModelReply::Silence`].
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() || is_silence_marker(trimmed) {
            ModelReply::Silence
        } else {
            ModelReply::Spoke(trimmed.to_string())
        }
    }

    #[must_use]
    pub fn is_silence(&self) -> bool {
        matches!(self, ModelReply::Silence)
    }
}

/// The reserved "model chose not to speak" marker: exactly three hyphens,
/// or the tolerated near-variants (a bare hyphen, short en-/em-dash runs,
/// optionally space-separated).
#[must_use]
pub fn is_silence_marker(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    let mut dashes = 0usize;
    for ch in trimmed.chars() {
        match ch {
            '-' | '–' | '—' => dashes += 1,
            ch if ch.is_whitespace() => {}
            _ => return false,
        }
    }
    (1..=3).contains(&dashes)
}

/// Strip a Markdown code fence (```/```json) wrapping, which at least one
/// backend family emits even when JSON mode was requested.
#[must_use]
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", ...) on the opening fence.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn build_adapter(config: &ProviderConfig) -> Box<dyn ProviderAdapter> {
    match config.kind {
        ProviderKind::Gemini => Box::new(GeminiAdapter::new(config)),
        ProviderKind::OpenAi => Box::new(OpenAiAdapter::new(config)),
    }
}

/// Issues generation calls against the configured backend.
pub struct ProviderClient {
    http: reqwest::Client,
    adapter: Box<dyn ProviderAdapter>,
}

impl ProviderClient {
    /// Build a client for the configured backend.
    ///
    /// Fails eagerly with [`ProviderError::MissingApiKey`] so a
    /// misconfigured session never gets as far as processing audio.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey {
                provider: config.kind.as_str(),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            adapter: build_adapter(config),
        })
    }

    /// Name of the active backend, for logs and events.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.adapter.name()
    }

    /// Run one generation attempt and normalize the result.
    ///
    /// A 429 is classified into [`ProviderError::RateLimited`] carrying the
    /// backend's backoff hint (or [`DEFAULT_RATE_LIMIT_BACKOFF`]); it is
    /// never retried here. Other failures map to
    /// [`ProviderError::Http`] / [`ProviderError::Network`].
    #[instrument(skip(self, request), fields(provider = self.adapter.name()))]
    pub async fn generate(&self, request: &GenerationRequest) -> Result<ModelReply, ProviderError> {
        let text = self.call(request).await?;
        let reply = ModelReply::from_text(&text);
        if reply.is_silence() {
            debug!("model chose silence");
        }
        Ok(reply)
    }

    /// Run one generation attempt in JSON mode and parse the structured
    /// reply, stripping code fences first. Parse failures are surfaced as
    /// [`ProviderError::StructuredOutput`], never coerced into plain text.
    pub async fn generate_json(&self, request: &GenerationRequest) -> Result<Value, ProviderError> {
        let mut request = request.clone();
        request.json_mode = true;
        let text = self.call(&request).await?;
        let stripped = strip_code_fences(&text);
        serde_json::from_str(stripped).map_err(|err| ProviderError::StructuredOutput {
            message: format!("{err}; raw: {}", truncate(stripped, 200)),
        })
    }

    async fn call(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let wire = self.adapter.build_request(request);
        let mut outbound = self.http.post(&wire.url);
        for (name, value) in &wire.headers {
            outbound = outbound.header(name.as_str(), value.as_str());
        }
        let response = outbound.json(&wire.body).send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let raw = response.text().await?;
        let body: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = self
                .adapter
                .parse_backoff(&headers, &body)
                .unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF);
            warn!(?retry_after, "provider rate limited");
            return Err(ProviderError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: truncate(&raw, 300),
            });
        }
        self.adapter.extract_text(&body)
    }
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
