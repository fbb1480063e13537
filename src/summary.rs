//! Structured call summaries.
//!
//! On demand, the accumulated conversation history is sent through the
//! provider in JSON mode and parsed into a [`CallSummary`]. Parse failures
//! surface as structured-output errors; a summary with broken structure
//! is worse than no summary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coordinator::ConversationTurn;
use crate::error::ProviderError;
use crate::providers::GenerationRequest;

/// Structured summary of the conversation so far.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
}

const SUMMARY_SYSTEM_PROMPT: &str = "You summarize live call transcripts. \
Respond with a JSON object containing exactly these fields: \
\"summary\" (string, 2-3 sentences), \
\"key_points\" (array of strings, the main topics discussed), \
\"action_items\" (array of strings, concrete follow-ups). \
Respond with JSON only.";

/// Build the JSON-mode request that produces a [`CallSummary`].
#[must_use]
pub fn summary_request(mut turns: Vec<ConversationTurn>, max_tokens: u32) -> GenerationRequest {
    turns.push(ConversationTurn::user(
        "Summarize the conversation so far as JSON.",
    ));
    GenerationRequest {
        turns,
        system_prompt: SUMMARY_SYSTEM_PROMPT.to_string(),
        max_tokens,
        temperature: 0.3,
        json_mode: true,
    }
}

/// Parse the provider's structured reply into a [`CallSummary`].
pub fn parse_summary(value: &Value) -> Result<CallSummary, ProviderError> {
    serde_json::from_value(value.clone()).map_err(|err| ProviderError::StructuredOutput {
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_json_mode_with_trailing_instruction() {
        let turns = vec![ConversationTurn::user("what is the price?")];
        let request = summary_request(turns, 256);
        assert!(request.json_mode);
        assert_eq!(request.turns.len(), 2);
        assert!(request.turns[1].text.contains("Summarize"));
    }

    #[test]
    fn parses_complete_summary() {
        let value = serde_json::json!({
            "summary": "Pricing call with an enterprise prospect.",
            "key_points": ["pricing", "timeline"],
            "action_items": ["send proposal"],
        });
        let summary = parse_summary(&value).unwrap();
        assert_eq!(summary.key_points.len(), 2);
        assert_eq!(summary.action_items, vec!["send proposal".to_string()]);
    }

    #[test]
    fn missing_optional_arrays_default_to_empty() {
        let value = serde_json::json!({ "summary": "Short call." });
        let summary = parse_summary(&value).unwrap();
        assert!(summary.key_points.is_empty());
        assert!(summary.action_items.is_empty());
    }

    #[test]
    fn missing_summary_field_is_a_structured_output_error() {
        let value = serde_json::json!({ "key_points": [] });
        assert!(matches!(
            parse_summary(&value),
            Err(ProviderError::StructuredOutput { .. })
        ));
    }
}
