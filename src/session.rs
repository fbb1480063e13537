//! The session actor: one task owning the whole pipeline.
//!
//! A session wires the endpointer, coordinator, retriever, and provider
//! client together behind a [`SessionHandle`]. One spawned task processes
//! transcript events, the endpointing fallback timer, and generation
//! completions, strictly in arrival order, with no shared mutable state
//! outside the actor.
//!
//! Generation attempts run as spawned sub-tasks so the actor keeps
//! consuming transcript events while a call is in flight; the coordinator's
//! overlap guard rejects (never queues) utterances that arrive meanwhile.
//! Ending the session cancels the pending fallback timer after a final
//! drain flush, abandons any in-flight call (its completion message lands
//! in a channel nobody reads), and resets the coordinator state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::SessionConfig;
use crate::coordinator::{ConversationTurn, Coordinator};
use crate::embedding::EmbeddingClient;
use crate::endpointing::{EndpointAction, Endpointer, FALLBACK_WINDOW};
use crate::error::{ProviderError, SessionError};
use crate::events::{Outbox, SessionEvent, SessionPhase};
use crate::kb::retrieval::{RetrievalOutcome, Retriever};
use crate::kb::store::ChunkStore;
use crate::providers::{GenerationRequest, ModelReply, ProviderClient};
use crate::suggestion::Suggestion;
use crate::summary::{self, CallSummary};
use crate::transcript::{SpeakerTracker, TranscriptEvent, Utterance};

enum SessionCommand {
    Transcript(TranscriptEvent),
    Summarize(oneshot::Sender<Result<CallSummary, ProviderError>>),
    End,
}

/// Result of one generation attempt, reported back to the actor.
enum GenerationOutcome {
    Suggestion {
        suggestion: Suggestion,
        trigger: String,
    },
    Silence,
    RateLimited(Duration),
    Failed(String),
}

/// Client-side handle to a running session.
pub struct SessionHandle {
    commands: flume::Sender<SessionCommand>,
    events: flume::Receiver<SessionEvent>,
    task: tokio::task::JoinHandle<()>,
}

impl SessionHandle {
    /// Feed one raw transcript event into the pipeline.
    pub fn push(&self, event: TranscriptEvent) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::Transcript(event))
            .map_err(|_| SessionError::Closed)
    }

    /// Subscribe to the outbound event stream. May be called repeatedly;
    /// receivers compete for events, so a UI normally holds exactly one.
    #[must_use]
    pub fn events(&self) -> flume::Receiver<SessionEvent> {
        self.events.clone()
    }

    /// Request a structured summary of the conversation so far.
    pub async fn summarize(&self) -> Result<CallSummary, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Summarize(reply_tx))
            .map_err(|_| SessionError::Closed)?;
        reply_rx
            .await
            .map_err(|_| SessionError::Closed)?
            .map_err(SessionError::from)
    }

    /// End the session: drain the endpointer, abandon in-flight work, and
    /// wait for the actor to finish.
    pub async fn end(self) {
        let _ = self.commands.send(SessionCommand::End);
        let _ = self.task.await;
    }
}

/// Entry point for running sessions.
pub struct Session;

impl Session {
    /// Spawn a session actor over the given corpus store and embedding
    /// client.
    ///
    /// Fails eagerly on configuration problems (missing provider API key);
    /// everything downstream degrades per turn instead of failing the
    /// session.
    pub fn spawn(
        config: SessionConfig,
        store: Arc<dyn ChunkStore>,
        embeddings: Arc<dyn EmbeddingClient>,
    ) -> Result<SessionHandle, SessionError> {
        let provider = Arc::new(ProviderClient::new(&config.provider)?);
        let retriever = Arc::new(Retriever::new(store, embeddings, config.retrieval.clone()));

        let (command_tx, command_rx) = flume::unbounded();
        let (event_tx, event_rx) = flume::unbounded();
        let (done_tx, done_rx) = flume::unbounded();

        let actor = SessionActor {
            coordinator: Coordinator::new(config.cooldown),
            endpointer: Endpointer::new(FALLBACK_WINDOW),
            tracker: SpeakerTracker::new(),
            first_speaker: None,
            config,
            retriever,
            provider,
            outbox: Outbox::new(event_tx),
            done_tx,
        };
        let task = tokio::spawn(actor.run(command_rx, done_rx));

        Ok(SessionHandle {
            commands: command_tx,
            events: event_rx,
            task,
        })
    }
}

struct SessionActor {
    config: SessionConfig,
    coordinator: Coordinator,
    endpointer: Endpointer,
    tracker: SpeakerTracker,
    first_speaker: Option<String>,
    retriever: Arc<Retriever>,
    provider: Arc<ProviderClient>,
    outbox: Outbox,
    done_tx: flume::Sender<GenerationOutcome>,
}

impl SessionActor {
    #[instrument(skip_all, fields(provider = self.provider.provider_name()))]
    async fn run(
        mut self,
        commands: flume::Receiver<SessionCommand>,
        done_rx: flume::Receiver<GenerationOutcome>,
    ) {
        info!("session started");
        self.outbox
            .emit(SessionEvent::status(SessionPhase::Listening, "session started"));

        loop {
            let deadline = self.endpointer.deadline();
            let fallback = async {
                match deadline {
                    Some((at, epoch)) => {
                        tokio::time::sleep_until(at).await;
                        epoch
                    }
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                command = commands.recv_async() => match command {
                    Ok(SessionCommand::Transcript(event)) => self.on_transcript(event),
                    Ok(SessionCommand::Summarize(reply)) => self.on_summarize(reply),
                    Ok(SessionCommand::End) | Err(_) => break,
                },
                epoch = fallback => {
                    if let Some(utterance) = self.endpointer.flush_due(epoch) {
                        self.on_utterance(utterance);
                    }
                }
                outcome = done_rx.recv_async() => {
                    if let Ok(outcome) = outcome {
                        self.on_generation_done(outcome);
                    }
                }
            }
        }

        // Shutdown: surface any buffered tail for the transcript display,
        // then reset. An in-flight generation is abandoned, not cancelled;
        // its completion message lands in a channel nobody reads anymore.
        if let Some(utterance) = self.endpointer.drain() {
            let role = self.tracker.observe(&utterance.speaker, &utterance.text);
            self.outbox.emit(SessionEvent::Utterance { utterance, role });
        }
        self.coordinator.reset();
        self.tracker.reset();
        self.outbox
            .emit(SessionEvent::status(SessionPhase::Ended, "session ended"));
        info!("session ended");
    }

    fn on_transcript(&mut self, event: TranscriptEvent) {
        match self.endpointer.feed(event, Instant::now()) {
            EndpointAction::None => {}
            EndpointAction::Interim(update) => {
                self.outbox.emit(SessionEvent::Interim(update));
            }
            EndpointAction::Flush(utterance) => self.on_utterance(utterance),
        }
    }

    fn on_utterance(&mut self, utterance: Utterance) {
        let role = self.tracker.observe(&utterance.speaker, &utterance.text);
        self.outbox.emit(SessionEvent::Utterance {
            utterance: utterance.clone(),
            role,
        });

        if self.config.skip_first_speaker {
            let first = self
                .first_speaker
                .get_or_insert_with(|| utterance.speaker.clone());
            if *first == utterance.speaker {
                debug!(speaker = %utterance.speaker, "skipping own speech");
                return;
            }
        }

        let decision = self.coordinator.admit(&utterance, Instant::now());
        if !decision.is_admitted() {
            return;
        }

        let turns = self.coordinator.history().snapshot();
        self.spawn_generation(turns, utterance.text);
    }

    fn spawn_generation(&self, turns: Vec<ConversationTurn>, trigger: String) {
        let retriever = self.retriever.clone();
        let provider = self.provider.clone();
        let done = self.done_tx.clone();
        let system_prompt = self.config.system_prompt.clone();
        let allowed = self.config.allowed_documents.clone();
        let max_context = self.config.retrieval.max_context_chars;
        let max_tokens = self.config.provider.max_tokens;
        let temperature = self.config.provider.temperature;

        tokio::spawn(async move {
            let kb = match retriever.search(&trigger, &allowed).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(error = %err, "KB retrieval failed; continuing without context");
                    RetrievalOutcome::empty()
                }
            };

            let request = GenerationRequest {
                turns,
                system_prompt: compose_system_prompt(&system_prompt, &kb, max_context),
                max_tokens,
                temperature,
                json_mode: false,
            };

            let outcome = match provider.generate(&request).await {
                Ok(ModelReply::Spoke(text)) => GenerationOutcome::Suggestion {
                    suggestion: Suggestion::from_reply(&text, &trigger, kb.source.clone()),
                    trigger,
                },
                Ok(ModelReply::Silence) => GenerationOutcome::Silence,
                Err(ProviderError::RateLimited { retry_after }) => {
                    GenerationOutcome::RateLimited(retry_after)
                }
                Err(err) => GenerationOutcome::Failed(err.to_string()),
            };
            // The session may have ended meanwhile; a failed send just
            // means the result is discarded.
            let _ = done.send(outcome);
        });
    }

    fn on_generation_done(&mut self, outcome: GenerationOutcome) {
        self.coordinator.finish_generation();
        match outcome {
            GenerationOutcome::Suggestion {
                suggestion,
                trigger,
            } => {
                self.coordinator
                    .history_mut()
                    .push_assistant(suggestion.text.clone());
                info!(kind = suggestion.kind.as_str(), "suggestion ready");
                self.outbox.emit(SessionEvent::Suggestion {
                    suggestion,
                    trigger,
                });
            }
            GenerationOutcome::Silence => {
                debug!("generation finished with silence");
            }
            GenerationOutcome::RateLimited(retry_after) => {
                self.coordinator
                    .note_rate_limited(retry_after, Instant::now());
                warn!(?retry_after, "provider rate limited; backing off");
            }
            GenerationOutcome::Failed(message) => {
                warn!(%message, "generation failed; no suggestion this turn");
            }
        }
    }

    fn on_summarize(&self, reply: oneshot::Sender<Result<CallSummary, ProviderError>>) {
        let provider = self.provider.clone();
        let turns = self.coordinator.history().snapshot();
        let max_tokens = self.config.provider.max_tokens;
        tokio::spawn(async move {
            let request = summary::summary_request(turns, max_tokens);
            let result = match provider.generate_json(&request).await {
                Ok(value) => summary::parse_summary(&value),
                Err(err) => Err(err),
            };
            let _ = reply.send(result);
        });
    }
}

/// Append the KB context block to the base system prompt, when retrieval
/// found anything.
fn compose_system_prompt(base: &str, kb: &RetrievalOutcome, max_context_chars: usize) -> String {
    if !kb.matched {
        return base.to_string();
    }
    format!(
        "{base}\n\nRELEVANT KNOWLEDGE BASE CONTENT:\n{}\n\nUse this material for specific, \
         accurate answers and cite details when relevant.",
        kb.context_text(max_context_chars)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::retrieval::RetrievedChunk;

    #[test]
    fn prompt_unchanged_without_kb_matches() {
        let prompt = compose_system_prompt("base prompt", &RetrievalOutcome::empty(), 1_000);
        assert_eq!(prompt, "base prompt");
    }

    #[test]
    fn prompt_gains_context_block_with_matches() {
        let outcome = RetrievalOutcome {
            matches: vec![RetrievedChunk {
                document_id: "d1".into(),
                document_name: "pricing.md".into(),
                chunk_id: "d1_0".into(),
                text: "Custom quotes only.".into(),
                score: 0.9,
            }],
            matched: true,
            source: Some("pricing.md".into()),
        };
        let prompt = compose_system_prompt("base prompt", &outcome, 1_000);
        assert!(prompt.starts_with("base prompt"));
        assert!(prompt.contains("RELEVANT KNOWLEDGE BASE CONTENT"));
        assert!(prompt.contains("pricing.md"));
    }
}
