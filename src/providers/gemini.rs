//! Gemini wire adapter.
//!
//! Credentials travel as a `key` query parameter. Conversation turns map
//! onto the `contents` array with the `user`/`model` role vocabulary, the
//! system prompt rides in `systemInstruction`, and generation knobs live
//! in `generationConfig` (`maxOutputTokens`, `responseMimeType` for JSON
//! mode). A 429's backoff hint is a structured RetryInfo detail in the
//! error body with a `"14s"`-style `retryDelay`.

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::{Value, json};

use crate::config::ProviderConfig;
use crate::coordinator::TurnRole;
use crate::error::ProviderError;

use super::{GenerationRequest, ProviderAdapter, WireRequest};

/// Public Gemini API endpoint.
pub const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiAdapter {
    model: String,
    api_key: String,
    base_url: String,
}

impl GeminiAdapter {
    #[must_use]
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE.to_string()),
        }
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn build_request(&self, request: &GenerationRequest) -> WireRequest {
        let contents: Vec<Value> = request
            .turns
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "model",
                };
                json!({ "role": role, "parts": [ { "text": turn.text } ] })
            })
            .collect();

        let mut generation_config = json!({
            "maxOutputTokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if request.json_mode {
            generation_config["responseMimeType"] = json!("application/json");
        }

        WireRequest {
            url: format!(
                "{}/v1beta/models/{}:generateContent?key={}",
                self.base_url, self.model, self.api_key
            ),
            headers: Vec::new(),
            body: json!({
                "contents": contents,
                "systemInstruction": { "parts": [ { "text": request.system_prompt } ] },
                "generationConfig": generation_config,
            }),
        }
    }

    fn extract_text(&self, body: &Value) -> Result<String, ProviderError> {
        let parts = body
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .ok_or(ProviderError::EmptyResponse)?;

        let text: String = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text)
    }

    fn parse_backoff(&self, _headers: &HeaderMap, body: &Value) -> Option<Duration> {
        let details = body.get("error")?.get("details")?.as_array()?;
        let retry_info = details.iter().find(|detail| {
            detail
                .get("@type")
                .and_then(Value::as_str)
                .is_some_and(|t| t.ends_with("RetryInfo"))
        })?;
        let delay = retry_info.get("retryDelay")?.as_str()?;
        parse_retry_delay(delay)
    }
}

/// Parse a protobuf-duration string such as `"14s"` or `"3.5s"`.
fn parse_retry_delay(delay: &str) -> Option<Duration> {
    let seconds: f64 = delay.trim().strip_suffix('s')?.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(seconds))
}
