//! Transcript event types and speaker role tracking.
//!
//! [`TranscriptEvent`] is the raw inbound shape from the speech-to-text
//! collaborator; [`Utterance`] is the stable unit the endpointer emits once
//! a boundary has been detected. [`SpeakerTracker`] watches the finished
//! utterances and infers which participant is the customer, based on who
//! asks the questions.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::suggestion::is_question;

/// Raw transcript segment as delivered by the STT collaborator.
///
/// `is_final` marks a segment whose text will not change anymore;
/// `speech_final` additionally marks the end of a spoken thought. Interim
/// segments (`is_final == false`) are display-only and may be rewritten by
/// later events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub speaker: String,
    pub is_final: bool,
    pub speech_final: bool,
    #[serde(default)]
    pub confidence: f32,
    /// Milliseconds since the session's epoch (collaborator-defined).
    #[serde(default)]
    pub timestamp_ms: u64,
}

impl TranscriptEvent {
    /// Convenience constructor for an interim (still mutable) segment.
    #[must_use]
    pub fn interim(text: &str, speaker: &str) -> Self {
        Self {
            text: text.to_string(),
            speaker: speaker.to_string(),
            is_final: false,
            speech_final: false,
            confidence: 0.0,
            timestamp_ms: 0,
        }
    }

    /// Convenience constructor for a finalized segment.
    #[must_use]
    pub fn final_segment(text: &str, speaker: &str, speech_final: bool) -> Self {
        Self {
            text: text.to_string(),
            speaker: speaker.to_string(),
            is_final: true,
            speech_final,
            confidence: 0.0,
            timestamp_ms: 0,
        }
    }

    /// A structurally valid event carries a speaker label and, unless it is
    /// a boundary-only marker (`speech_final`), some text. Anything else is
    /// dropped at the pipeline edge.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        if self.speaker.trim().is_empty() {
            return false;
        }
        !self.text.trim().is_empty() || (self.is_final && self.speech_final)
    }
}

/// A stable, complete unit of speech ready for downstream processing.
///
/// Immutable once emitted by the endpointer and consumed exactly once by
/// the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub speaker: String,
    /// Always `true`: only finalized text ever reaches an utterance.
    pub is_final: bool,
    /// Whether the boundary came from an explicit `speech_final` marker
    /// (`true`) or the fallback timer (`false`).
    pub is_speech_final: bool,
    pub confidence: f32,
    pub timestamp_ms: u64,
}

impl Utterance {
    /// Number of whitespace-separated words after trimming.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Inferred conversational role of a speaker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    #[default]
    Unknown,
    /// The counterpart: asks the questions the assistant should help with.
    Customer,
    /// The assisted user.
    Consultant,
}

#[derive(Debug, Default)]
struct SpeakerStats {
    questions: usize,
}

/// Infers speaker roles from conversation patterns.
///
/// Heuristic: once at least three questions have been observed across two
/// or more speakers, the speaker who asked strictly more of them is tagged
/// [`SpeakerRole::Customer`] and the runner-up [`SpeakerRole::Consultant`].
/// Assignments are revisited on every utterance, so an early wrong guess
/// corrects itself as the call goes on.
#[derive(Debug, Default)]
pub struct SpeakerTracker {
    stats: FxHashMap<String, SpeakerStats>,
    roles: FxHashMap<String, SpeakerRole>,
}

impl SpeakerTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished utterance and return the speaker's current role.
    pub fn observe(&mut self, speaker: &str, text: &str) -> SpeakerRole {
        let stats = self.stats.entry(speaker.to_string()).or_default();
        if is_question(text) {
            stats.questions += 1;
        }
        self.reassign();
        self.role(speaker)
    }

    /// Current role assignment for a speaker.
    #[must_use]
    pub fn role(&self, speaker: &str) -> SpeakerRole {
        self.roles.get(speaker).copied().unwrap_or_default()
    }

    /// Forget all accumulated statistics and assignments.
    pub fn reset(&mut self) {
        self.stats.clear();
        self.roles.clear();
    }

    fn reassign(&mut self) {
        if self.stats.len() < 2 {
            return;
        }
        let mut ranked: Vec<(&String, usize)> = self
            .stats
            .iter()
            .map(|(speaker, stats)| (speaker, stats.questions))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let (leader, leader_questions) = (ranked[0].0.clone(), ranked[0].1);
        let (runner_up, runner_questions) = (ranked[1].0.clone(), ranked[1].1);
        if leader_questions + runner_questions >= 3 && leader_questions > runner_questions {
            self.roles.insert(leader, SpeakerRole::Customer);
            self.roles.insert(runner_up, SpeakerRole::Consultant);
        }
    }
}
