//! Throttle & concurrency coordinator.
//!
//! For every stable utterance the coordinator decides, synchronously and in
//! a fixed order, whether a generation attempt may run: minimum length,
//! single-flight overlap guard, rate-limit backoff window, cooldown. The
//! first failing check wins; rejections are not errors and are logged at
//! debug level only.
//!
//! Admission stamps the cooldown clock *before* the downstream call is
//! issued, so a long-running call cannot be raced by the next cooldown
//! check. The stamp is intentionally never rolled back on failure: a failed
//! attempt still consumes its cooldown window, which keeps a flaky
//! provider from being hammered in a hot loop.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::transcript::Utterance;

/// Maximum number of retained conversation turns.
pub const MAX_HISTORY_TURNS: usize = 20;

/// Minimum words an utterance needs to be considered for generation.
pub const MIN_UTTERANCE_WORDS: usize = 2;

/// Who produced a conversation turn. A closed set on purpose: provider
/// adapters map these into their own role vocabularies at the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One turn of conversational context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ConversationTurn {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }
}

/// Bounded FIFO of conversation turns (max [`MAX_HISTORY_TURNS`]).
///
/// Appending beyond the bound evicts the oldest turn, so the most recent
/// context always survives.
#[derive(Clone, Debug, Default)]
pub struct ChatHistory {
    turns: VecDeque<ConversationTurn>,
}

impl ChatHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        if self.turns.len() == MAX_HISTORY_TURNS {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(ConversationTurn::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.push(ConversationTurn::assistant(text));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Snapshot of the turns in order, oldest first. Generation tasks take
    /// this owned copy so the live history stays with the session actor.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Per-session mutable generation state, owned exclusively by the session
/// actor. Reset at session start, destroyed at session end.
#[derive(Debug, Default)]
pub struct GenerationState {
    /// When the last admitted attempt started (the cooldown anchor).
    pub last_attempt: Option<Instant>,
    /// End of the current rate-limit backoff window, if one is open.
    pub rate_limited_until: Option<Instant>,
    /// Strict mutual-exclusion flag: at most one attempt in flight.
    pub generating: bool,
    pub history: ChatHistory,
}

/// Outcome of the admission check, in check order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Run a generation attempt now.
    Admitted,
    /// Fewer than [`MIN_UTTERANCE_WORDS`] words after trimming.
    TooShort,
    /// Another attempt is already in flight; this utterance is dropped,
    /// not queued.
    InFlight,
    /// Inside a rate-limit backoff window.
    RateLimited { until: Instant },
    /// The cooldown since the previous attempt has not elapsed.
    CoolingDown { ready_at: Instant },
}

impl AdmissionDecision {
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionDecision::Admitted)
    }
}

/// The throttle coordinator. See the module docs for the admission order.
#[derive(Debug)]
pub struct Coordinator {
    cooldown: Duration,
    state: GenerationState,
}

impl Coordinator {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: GenerationState::default(),
        }
    }

    /// Evaluate an utterance against the admission sequence.
    ///
    /// On admission this atomically (from the single actor's perspective)
    /// marks the attempt in flight, stamps the cooldown anchor, and appends
    /// the utterance to the chat history, so context persists even when the
    /// attempt later fails or the model chooses silence.
    pub fn admit(&mut self, utterance: &Utterance, now: Instant) -> AdmissionDecision {
        if !utterance.is_final || utterance.word_count() < MIN_UTTERANCE_WORDS {
            debug!(text = %utterance.text, "rejecting utterance: too short");
            return AdmissionDecision::TooShort;
        }
        if self.state.generating {
            debug!("rejecting utterance: generation already in flight");
            return AdmissionDecision::InFlight;
        }
        if let Some(until) = self.state.rate_limited_until {
            if now < until {
                debug!(?until, "rejecting utterance: rate-limit backoff active");
                return AdmissionDecision::RateLimited { until };
            }
            self.state.rate_limited_until = None;
        }
        if let Some(last) = self.state.last_attempt {
            let ready_at = last + self.cooldown;
            if now < ready_at {
                debug!(?ready_at, "rejecting utterance: cooldown active");
                return AdmissionDecision::CoolingDown { ready_at };
            }
        }

        self.state.generating = true;
        self.state.last_attempt = Some(now);
        self.state.history.push_user(utterance.text.clone());
        AdmissionDecision::Admitted
    }

    /// Release the single-flight guard. Must be called exactly once per
    /// admitted attempt, whatever its outcome. The cooldown anchor is left
    /// untouched.
    pub fn finish_generation(&mut self) {
        self.state.generating = false;
    }

    /// Open a backoff window after a 429 outcome.
    pub fn note_rate_limited(&mut self, retry_after: Duration, now: Instant) {
        self.state.rate_limited_until = Some(now + retry_after);
    }

    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.state.generating
    }

    #[must_use]
    pub fn history(&self) -> &ChatHistory {
        &self.state.history
    }

    pub fn history_mut(&mut self) -> &mut ChatHistory {
        &mut self.state.history
    }

    /// Reset all state to its initial values (session end / restart).
    pub fn reset(&mut self) {
        self.state = GenerationState::default();
    }
}
