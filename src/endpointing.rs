//! Transcript endpointing: raw STT segments in, stable utterances out.
//!
//! Speech-to-text services report the same stretch of audio several times:
//! interim guesses, finalized segments, and (sometimes) an explicit
//! `speech_final` marker closing the spoken thought. [`Endpointer`] folds
//! that stream into discrete [`Utterance`]s without fragmenting sentences
//! and without stalling when the upstream service never closes a segment.
//!
//! The machine has two states: `Idle` (nothing buffered) and
//! `Accumulating` (finalized segments buffered, fallback deadline armed).
//! `speech_final` flushes immediately; otherwise the fallback timer flushes
//! 700 ms after the last finalized segment.
//!
//! The type is a pure state machine: it never sleeps or spawns. The caller
//! (the session actor) reads [`Endpointer::deadline`] to arm its own timer
//! and calls [`Endpointer::flush_due`] when it fires. Every flush bumps an
//! epoch counter and each armed deadline carries the epoch it was created
//! under, so a timer wake that lost the race against a `speech_final` event
//! is recognized as stale and ignored instead of double-flushing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::transcript::{TranscriptEvent, Utterance};

/// Fallback flush window: how long after the last finalized segment the
/// buffer is force-flushed when no `speech_final` marker arrives.
pub const FALLBACK_WINDOW: Duration = Duration::from_millis(700);

/// Display-only update for text that may still change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterimUpdate {
    pub text: String,
    pub speaker: String,
    pub timestamp_ms: u64,
}

/// What the caller should do with the event it just fed in.
#[derive(Clone, Debug, PartialEq)]
pub enum EndpointAction {
    /// Nothing to surface (segment buffered, or event dropped).
    None,
    /// Forward an interim display update; not a stable utterance.
    Interim(InterimUpdate),
    /// A stable utterance is ready for the coordinator.
    Flush(Utterance),
}

#[derive(Debug)]
enum State {
    Idle,
    Accumulating {
        segments: Vec<TranscriptEvent>,
        deadline: Instant,
    },
}

/// The endpointing state machine. See the module docs for the protocol.
#[derive(Debug)]
pub struct Endpointer {
    fallback: Duration,
    state: State,
    epoch: u64,
}

impl Default for Endpointer {
    fn default() -> Self {
        Self::new(FALLBACK_WINDOW)
    }
}

impl Endpointer {
    #[must_use]
    pub fn new(fallback: Duration) -> Self {
        Self {
            fallback,
            state: State::Idle,
            epoch: 0,
        }
    }

    /// Feed one raw transcript event.
    ///
    /// Malformed events are dropped (logged at debug); they never surface
    /// an error to the caller.
    pub fn feed(&mut self, event: TranscriptEvent, now: Instant) -> EndpointAction {
        if !event.is_well_formed() {
            debug!(speaker = %event.speaker, "dropping malformed transcript event");
            return EndpointAction::None;
        }

        if !event.is_final {
            return EndpointAction::Interim(InterimUpdate {
                text: event.text,
                speaker: event.speaker,
                timestamp_ms: event.timestamp_ms,
            });
        }

        if event.speech_final {
            self.buffer(event, now);
            return match self.flush(true) {
                Some(utterance) => EndpointAction::Flush(utterance),
                None => EndpointAction::None,
            };
        }

        self.buffer(event, now);
        EndpointAction::None
    }

    /// The armed fallback deadline, if any, with the epoch it belongs to.
    #[must_use]
    pub fn deadline(&self) -> Option<(Instant, u64)> {
        match &self.state {
            State::Idle => None,
            State::Accumulating { deadline, .. } => Some((*deadline, self.epoch)),
        }
    }

    /// Fallback timer expiry. Flushes only when `epoch` still matches the
    /// epoch the deadline was armed under; a stale wake is a no-op.
    pub fn flush_due(&mut self, epoch: u64) -> Option<Utterance> {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "ignoring stale fallback timer");
            return None;
        }
        self.flush(false)
    }

    /// Force-flush whatever is buffered, e.g. when the session ends.
    pub fn drain(&mut self) -> Option<Utterance> {
        self.flush(false)
    }

    #[must_use]
    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, State::Accumulating { .. })
    }

    fn buffer(&mut self, event: TranscriptEvent, now: Instant) {
        let deadline = now + self.fallback;
        match &mut self.state {
            State::Idle => {
                let segments = if event.text.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![event]
                };
                self.state = State::Accumulating { segments, deadline };
            }
            State::Accumulating {
                segments,
                deadline: armed,
            } => {
                if !event.text.trim().is_empty() {
                    segments.push(event);
                }
                *armed = deadline;
            }
        }
    }

    fn flush(&mut self, speech_final: bool) -> Option<Utterance> {
        let segments = match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => return None,
            State::Accumulating { segments, .. } => segments,
        };
        self.epoch = self.epoch.wrapping_add(1);
        if segments.is_empty() {
            return None;
        }

        let text = segments
            .iter()
            .map(|segment| segment.text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        let first = &segments[0];
        let last = &segments[segments.len() - 1];

        Some(Utterance {
            text,
            speaker: last.speaker.clone(),
            is_final: true,
            is_speech_final: speech_final,
            confidence: last.confidence,
            timestamp_ms: first.timestamp_ms,
        })
    }
}
