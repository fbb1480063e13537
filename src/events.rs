//! Outbound session events.
//!
//! Everything the UI collaborator sees flows through [`SessionEvent`]: the
//! rolling interim text, finished utterances, suggestions, and lifecycle
//! status changes. Events are delivered over a `flume` channel; a
//! disconnected receiver never blocks or fails the pipeline, it just stops
//! listening.

use chrono::Utc;
use serde_json::{Value, json};
use tracing::debug;

use crate::endpointing::InterimUpdate;
use crate::suggestion::Suggestion;
use crate::transcript::{SpeakerRole, Utterance};

/// Session lifecycle phases surfaced as status events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Listening,
    Ended,
}

impl SessionPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Listening => "listening",
            SessionPhase::Ended => "ended",
        }
    }
}

/// One outbound event for the UI collaborator.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// Display-only text that may still be rewritten.
    Interim(InterimUpdate),
    /// A stable utterance, with the speaker's inferred role.
    Utterance {
        utterance: Utterance,
        role: SpeakerRole,
    },
    /// A coaching suggestion, with the utterance that triggered it.
    Suggestion {
        suggestion: Suggestion,
        trigger: String,
    },
    /// Lifecycle change.
    Status {
        phase: SessionPhase,
        message: String,
    },
}

impl SessionEvent {
    #[must_use]
    pub fn status(phase: SessionPhase, message: impl Into<String>) -> Self {
        SessionEvent::Status {
            phase,
            message: message.into(),
        }
    }

    /// Convert to the wire JSON shape consumed by UI collaborators.
    ///
    /// Every event carries a `type` discriminator and an RFC 3339
    /// `timestamp`.
    #[must_use]
    pub fn to_json_value(&self) -> Value {
        let (event_type, mut payload) = match self {
            SessionEvent::Interim(update) => (
                "interim",
                json!({
                    "text": update.text,
                    "speaker": update.speaker,
                    "timestamp_ms": update.timestamp_ms,
                }),
            ),
            SessionEvent::Utterance { utterance, role } => (
                "transcript",
                json!({
                    "text": utterance.text,
                    "speaker": utterance.speaker,
                    "speaker_role": role,
                    "is_final": utterance.is_final,
                    "speech_final": utterance.is_speech_final,
                    "confidence": utterance.confidence,
                    "timestamp_ms": utterance.timestamp_ms,
                }),
            ),
            SessionEvent::Suggestion {
                suggestion,
                trigger,
            } => (
                "suggestion",
                json!({
                    "text": suggestion.text,
                    "kind": suggestion.kind,
                    "kb_source": suggestion.kb_source,
                    "confidence": suggestion.confidence,
                    "trigger": trigger,
                }),
            ),
            SessionEvent::Status { phase, message } => (
                "status",
                json!({
                    "status": phase.as_str(),
                    "message": message,
                }),
            ),
        };

        let object = payload.as_object_mut().expect("payload is an object");
        object.insert("type".to_string(), json!(event_type));
        object.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
        payload
    }
}

/// Sending half of the session's event stream.
#[derive(Clone)]
pub struct Outbox {
    sender: flume::Sender<SessionEvent>,
}

impl Outbox {
    #[must_use]
    pub fn new(sender: flume::Sender<SessionEvent>) -> Self {
        Self { sender }
    }

    /// Emit an event. A gone receiver is logged and otherwise ignored;
    /// suggestions are advisory and the pipeline never blocks on the UI.
    pub fn emit(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            debug!("event receiver disconnected; dropping session event");
        }
    }
}
