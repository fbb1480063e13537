//! Knowledge base: document ingestion, storage, and similarity retrieval.
//!
//! ```text
//! upload bytes ──► ingest::Ingestor ──► chunking::chunk_text ──► EmbeddingClient
//!                                                       │
//!                                                       ▼
//!                                     store::ChunkStore (memory / sqlite)
//!                                                       │
//! query ──► retrieval::Retriever ── batched scan ───────┘
//!                  │
//!                  ▼
//!          RetrievalOutcome { matches, matched, source }
//! ```
//!
//! Persona scoping restricts retrieval to a configured set of document
//! ids; an empty set means the whole corpus. Only documents whose
//! ingestion completed are ever searchable.

pub mod chunking;
pub mod ingest;
pub mod retrieval;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

pub use chunking::{MAX_CHUNK_CHARS, chunk_text};
pub use ingest::{DocumentKind, IngestReport, Ingestor};
pub use retrieval::{RetrievalOutcome, RetrievedChunk, Retriever, cosine_similarity};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteChunkStore;
pub use store::{ChunkStore, DocumentStatus, KbDocument, MemoryChunkStore, StoredChunk};
