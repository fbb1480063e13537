//! # Cueline: Real-time Coaching Suggestion Pipeline
//!
//! Cueline turns a live stream of speech-to-text segments into throttled,
//! retrieval-augmented coaching suggestions, routed through one of several
//! interchangeable LLM backends.
//!
//! ## Core Concepts
//!
//! - **Endpointing**: interim/final/speech-final segments fold into stable
//!   utterances, with a fallback timer bounding worst-case latency
//! - **Throttling**: cooldown, rate-limit backoff, and a strict
//!   single-flight guard decide which utterances trigger generation
//! - **Retrieval**: a persona-scoped cosine-similarity scan over a locally
//!   ingested document corpus supplies grounding context
//! - **Providers**: a closed set of wire adapters maps one
//!   provider-agnostic request onto each backend's protocol
//! - **Silence**: "the model chose not to speak" is a first-class value,
//!   not an error and not a magic string
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cueline::config::SessionConfig;
//! use cueline::embedding::MockEmbeddingClient;
//! use cueline::events::SessionEvent;
//! use cueline::kb::MemoryChunkStore;
//! use cueline::session::Session;
//! use cueline::transcript::TranscriptEvent;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::from_env();
//! let handle = Session::spawn(
//!     config,
//!     Arc::new(MemoryChunkStore::new()),
//!     Arc::new(MockEmbeddingClient::default()),
//! )?;
//!
//! let events = handle.events();
//! handle.push(TranscriptEvent::final_segment(
//!     "What is your pricing model?",
//!     "Speaker 1",
//!     true,
//! ))?;
//!
//! while let Ok(event) = events.recv_async().await {
//!     if let SessionEvent::Suggestion { suggestion, .. } = event {
//!         println!("[{}] {}", suggestion.kind.as_str(), suggestion.text);
//!         break;
//!     }
//! }
//! handle.end().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Building a Corpus
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cueline::embedding::MockEmbeddingClient;
//! use cueline::kb::{Ingestor, MemoryChunkStore};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryChunkStore::new());
//! let ingestor = Ingestor::new(store.clone(), Arc::new(MockEmbeddingClient::default()));
//! let report = ingestor
//!     .ingest("handbook.md", include_bytes!("../README.md"), "markdown")
//!     .await?;
//! println!("ingested {} chunks", report.chunk_count);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`session`] - the session actor and its handle (start here)
//! - [`endpointing`] - the utterance boundary state machine
//! - [`coordinator`] - admission control and bounded chat history
//! - [`kb`] - chunking, storage, ingestion, and similarity retrieval
//! - [`providers`] - LLM wire adapters and the generation client
//! - [`embedding`] - embedding service clients
//! - [`suggestion`] - suggestion types and classification heuristics
//! - [`summary`] - structured call summaries
//! - [`events`] - the outbound event stream
//! - [`config`] - session configuration and environment loading
//! - [`error`] - per-subsystem error types
//! - [`telemetry`] - tracing setup for binaries

pub mod config;
pub mod coordinator;
pub mod embedding;
pub mod endpointing;
pub mod error;
pub mod events;
pub mod kb;
pub mod providers;
pub mod session;
pub mod suggestion;
pub mod summary;
pub mod telemetry;
pub mod transcript;
