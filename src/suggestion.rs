//! Suggestion types and the lightweight text heuristics around them.
//!
//! The model's reply is free text; this module decides what *kind* of help
//! it is (answer, question to ask, objection handler, background info) and
//! attaches a confidence heuristic. None of this gates generation; it only
//! labels the result for the UI collaborator.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Category of an emitted suggestion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    /// Direct answer to something the counterpart asked.
    Answer,
    /// A discovery question the user should ask next.
    Question,
    /// Material for handling pushback.
    Objection,
    /// Relevant background for a topic that came up.
    Info,
}

impl SuggestionKind {
    /// Stable lowercase label used in serialized events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionKind::Answer => "answer",
            SuggestionKind::Question => "question",
            SuggestionKind::Objection => "objection",
            SuggestionKind::Info => "info",
        }
    }
}

/// An AI-generated coaching suggestion, ready for the UI collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub kind: SuggestionKind,
    /// Name of the KB document the top retrieved chunk came from, if
    /// retrieval contributed context to this suggestion.
    pub kb_source: Option<String>,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

impl Suggestion {
    /// Build a suggestion from a model reply and the utterance that
    /// triggered it, classifying and scoring as we go.
    #[must_use]
    pub fn from_reply(reply: &str, trigger: &str, kb_source: Option<String>) -> Self {
        Self {
            text: reply.trim().to_string(),
            kind: classify_reply(reply, trigger),
            kb_source,
            confidence: confidence_for(reply),
            timestamp: Utc::now(),
        }
    }
}

static QUESTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\?\s*$",
        r"^(what|how|why|when|where|who|which|can|could|would|should|is|are|do|does|did)\b",
        r"\b(tell me|explain|describe|show me|help me understand|walk me through)\b",
        r"\b(wondering|curious|want to know|like to know|interested in)\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static question pattern"))
    .collect()
});

static OPPORTUNITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(need help|looking for|interested in|trying to|struggling with)\b",
        r"\b(pain point|challenge|problem|issue|difficulty|bottleneck)\b",
        r"\b(migrate|migration|modernize|modernization|transform|transformation)\b",
        r"\b(cost|expensive|budget|spending|optimize|savings)\b",
        r"\b(security|compliance|audit|vulnerability)\b",
        r"\b(legacy|technical debt|outdated|old system)\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static opportunity pattern"))
    .collect()
});

static OBJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(too expensive|too costly|over budget|can't afford)\b",
        r"\b(not sure|not convinced|hesitant|skeptical)\b",
        r"\b(already (have|use|using)|current (vendor|provider|solution))\b",
        r"\b(competitor|cheaper elsewhere|other option)\b",
        r"\b(concern|worried|risk)\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static objection pattern"))
    .collect()
});

/// Openers that disqualify a short acknowledgment from counting as a
/// question ("okay", "got it", ...).
const NON_QUESTION_STARTERS: &[&str] = &[
    "okay",
    "ok",
    "sure",
    "yes",
    "no",
    "right",
    "absolutely",
    "definitely",
    "thank",
    "thanks",
    "great",
    "good",
    "perfect",
    "exactly",
    "i see",
    "i understand",
    "got it",
    "makes sense",
];

/// Does this utterance look like a question worth reacting to?
///
/// Very short utterances and common acknowledgments are excluded before
/// the pattern check.
#[must_use]
pub fn is_question(text: &str) -> bool {
    let lowered = text.trim().to_ascii_lowercase();
    if lowered.split_whitespace().count() < 3 {
        return false;
    }
    if NON_QUESTION_STARTERS
        .iter()
        .any(|starter| lowered.starts_with(starter))
    {
        return false;
    }
    QUESTION_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(&lowered))
}

/// Does this utterance mention a topic worth volunteering information on,
/// even though it is not phrased as a question?
#[must_use]
pub fn is_opportunity(text: &str) -> bool {
    let lowered = text.trim().to_ascii_lowercase();
    OPPORTUNITY_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(&lowered))
}

/// Classify a model reply given the utterance that triggered it.
fn classify_reply(reply: &str, trigger: &str) -> SuggestionKind {
    let reply_lowered = reply.trim().to_ascii_lowercase();
    let trigger_lowered = trigger.trim().to_ascii_lowercase();

    if reply_lowered.ends_with('?')
        || reply_lowered.contains("suggest asking")
        || reply_lowered.contains("ask:")
        || reply_lowered.starts_with("ask ")
    {
        return SuggestionKind::Question;
    }
    if OBJECTION_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(&trigger_lowered))
    {
        return SuggestionKind::Objection;
    }
    if is_question(trigger) {
        return SuggestionKind::Answer;
    }
    SuggestionKind::Info
}

/// Heuristic confidence score in `[0, 1]`.
///
/// Structured replies and a glanceable length raise the score; hedging
/// phrases lower it.
#[must_use]
pub fn confidence_for(text: &str) -> f32 {
    let mut confidence: f32 = 0.7;

    if text
        .lines()
        .any(|line| line.trim_start().starts_with(['-', '*', '+']))
    {
        confidence += 0.1;
    }
    let words = text.split_whitespace().count();
    if (10..=300).contains(&words) {
        confidence += 0.1;
    }
    let lowered = text.to_ascii_lowercase();
    if ["i'm not sure", "i don't know", "might be", "possibly", "unclear"]
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        confidence -= 0.2;
    }
    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_direct_questions() {
        assert!(is_question("What is your pricing for the enterprise tier?"));
        assert!(is_question("how long does onboarding usually take"));
        assert!(is_question("I was wondering about your SLA guarantees"));
    }

    #[test]
    fn skips_acknowledgments_and_short_text() {
        assert!(!is_question("okay sounds good to me"));
        assert!(!is_question("got it, thanks for clarifying"));
        assert!(!is_question("why though"));
    }

    #[test]
    fn opportunity_topics_detected() {
        assert!(is_opportunity(
            "our biggest pain point is the legacy billing system"
        ));
        assert!(is_opportunity("we are trying to optimize cloud spending"));
        assert!(!is_opportunity("the weather has been nice lately"));
    }

    #[test]
    fn reply_ending_in_question_mark_classifies_as_question() {
        let kind = classify_reply(
            "Suggest asking: what is your current monthly spend?",
            "we use another vendor today",
        );
        assert_eq!(kind, SuggestionKind::Question);
    }

    #[test]
    fn objection_trigger_classifies_as_objection() {
        let kind = classify_reply(
            "Emphasize total cost of ownership over sticker price.",
            "honestly this seems too expensive for us",
        );
        assert_eq!(kind, SuggestionKind::Objection);
    }

    #[test]
    fn question_trigger_classifies_as_answer() {
        let kind = classify_reply(
            "The platform is SOC 2 Type II certified.",
            "what certifications do you hold?",
        );
        assert_eq!(kind, SuggestionKind::Answer);
    }

    #[test]
    fn statement_trigger_classifies_as_info() {
        let kind = classify_reply(
            "Relevant case study: similar rollout finished in six weeks.",
            "we are planning a rollout next quarter",
        );
        assert_eq!(kind, SuggestionKind::Info);
    }

    #[test]
    fn confidence_stays_in_unit_interval() {
        for text in [
            "",
            "- point one\n- point two",
            "I'm not sure, possibly, unclear",
            &"word ".repeat(500),
        ] {
            let score = confidence_for(text);
            assert!((0.0..=1.0).contains(&score), "score {score} out of range");
        }
    }

    #[test]
    fn structured_reply_scores_higher_than_hedged_reply() {
        let structured = confidence_for("- use the managed tier\n- cite the migration guide");
        let hedged = confidence_for("I'm not sure, it might be in the docs somewhere");
        assert!(structured > hedged);
    }
}
