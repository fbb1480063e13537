//! OpenAI-compatible wire adapter.
//!
//! Covers the OpenAI API and the compatible gateways several hosted
//! inference providers expose. Credentials travel as a bearer header,
//! turns map onto the `messages` array with the system prompt as the
//! leading `system` message, JSON mode is `response_format`, and a 429's
//! backoff hint is the `Retry-After` response header.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::{Value, json};

use crate::config::ProviderConfig;
use crate::coordinator::TurnRole;
use crate::error::ProviderError;

use super::{GenerationRequest, ProviderAdapter, WireRequest};

/// Public OpenAI API endpoint.
pub const OPENAI_BASE: &str = "https://api.openai.com";

pub struct OpenAiAdapter {
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiAdapter {
    #[must_use]
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE.to_string()),
        }
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn build_request(&self, request: &GenerationRequest) -> WireRequest {
        let mut messages = vec![json!({
            "role": "system",
            "content": request.system_prompt,
        })];
        messages.extend(request.turns.iter().map(|turn| {
            let role = match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
            };
            json!({ "role": role, "content": turn.text })
        }));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        WireRequest {
            url: format!("{}/v1/chat/completions", self.base_url),
            headers: vec![(
                "authorization".to_string(),
                format!("Bearer {}", self.api_key),
            )],
            body,
        }
    }

    fn extract_text(&self, body: &Value) -> Result<String, ProviderError> {
        let text = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .ok_or(ProviderError::EmptyResponse)?;
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    fn parse_backoff(&self, headers: &HeaderMap, _body: &Value) -> Option<Duration> {
        let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
        let seconds: f64 = value.trim().parse().ok()?;
        if !seconds.is_finite() || seconds < 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::ConversationTurn;

    fn adapter() -> OpenAiAdapter {
        OpenAiAdapter::new(&ProviderConfig {
            model: "gpt-4o-mini".into(),
            api_key: "sk-test".into(),
            ..ProviderConfig::default()
        })
    }

    fn request(json_mode: bool) -> GenerationRequest {
        GenerationRequest {
            turns: vec![
                ConversationTurn::user("what certifications do you hold?"),
                ConversationTurn::assistant("SOC 2 Type II."),
            ],
            system_prompt: "be brief".into(),
            max_tokens: 128,
            temperature: 0.2,
            json_mode,
        }
    }

    #[test]
    fn key_travels_in_the_bearer_header() {
        let wire = adapter().build_request(&request(false));
        assert!(wire.url.ends_with("/v1/chat/completions"));
        assert!(!wire.url.contains("sk-test"));
        assert_eq!(
            wire.headers,
            vec![("authorization".to_string(), "Bearer sk-test".to_string())]
        );
    }

    #[test]
    fn system_prompt_leads_the_messages_array() {
        let wire = adapter().build_request(&request(false));
        let messages = wire.body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "be brief");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(wire.body["max_tokens"], 128);
        assert!(wire.body.get("response_format").is_none());
    }

    #[test]
    fn json_mode_sets_response_format() {
        let wire = adapter().build_request(&request(true));
        assert_eq!(wire.body["response_format"]["type"], "json_object");
    }

    #[test]
    fn extracts_choice_content() {
        let body = serde_json::json!({
            "choices": [ { "message": { "role": "assistant", "content": "Lead with ROI." } } ]
        });
        assert_eq!(adapter().extract_text(&body).unwrap(), "Lead with ROI.");
    }

    #[test]
    fn empty_choices_is_an_empty_response() {
        let body = serde_json::json!({ "choices": [] });
        assert!(matches!(
            adapter().extract_text(&body),
            Err(ProviderError::EmptyResponse)
        ));
    }

    #[test]
    fn backoff_parsed_from_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "21".parse().unwrap());
        let backoff = adapter().parse_backoff(&headers, &Value::Null);
        assert_eq!(backoff, Some(Duration::from_secs(21)));
    }

    #[test]
    fn missing_or_malformed_retry_after_yields_none() {
        assert_eq!(adapter().parse_backoff(&HeaderMap::new(), &Value::Null), None);
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap());
        assert_eq!(adapter().parse_backoff(&headers, &Value::Null), None);
    }
}
