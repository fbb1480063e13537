//! Document ingestion: raw upload bytes → chunked, embedded, stored corpus.
//!
//! Only one document may be mid-ingestion at a time, enforced by a boolean
//! lock checked before any work starts and always released afterwards.
//! Concurrent reads (searches) are unaffected. A document's status moves
//! `Processing → Complete` on success and `Processing → Error` on any
//! failure, so a half-ingested document can never satisfy a query.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::embedding::EmbeddingClient;
use crate::error::KbError;
use crate::kb::chunking::{MAX_CHUNK_CHARS, chunk_text_with};
use crate::kb::store::{ChunkStore, DocumentStatus, KbDocument, StoredChunk};

/// Supported upload formats. Both are ingested as UTF-8 text; Markdown
/// markup is left in place since the chunker only cares about paragraph
/// and sentence boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    PlainText,
    Markdown,
}

impl DocumentKind {
    /// Map the collaborator's declared type onto a supported kind.
    pub fn from_declared(declared: &str) -> Result<Self, KbError> {
        match declared.trim().to_ascii_lowercase().as_str() {
            "txt" | "text" | "text/plain" => Ok(DocumentKind::PlainText),
            "md" | "markdown" | "text/markdown" => Ok(DocumentKind::Markdown),
            other => Err(KbError::UnsupportedFormat {
                declared: other.to_string(),
            }),
        }
    }
}

/// Texts embedded per embedding-service request.
const EMBED_BATCH: usize = 64;

/// Result of a successful ingestion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunk_count: usize,
}

/// Drives uploads through chunking, embedding, and storage.
pub struct Ingestor {
    store: Arc<dyn ChunkStore>,
    embeddings: Arc<dyn EmbeddingClient>,
    max_chunk_chars: usize,
    busy: AtomicBool,
}

impl Ingestor {
    #[must_use]
    pub fn new(store: Arc<dyn ChunkStore>, embeddings: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            store,
            embeddings,
            max_chunk_chars: MAX_CHUNK_CHARS,
            busy: AtomicBool::new(false),
        }
    }

    /// Override the chunk budget (tests and tuning).
    #[must_use]
    pub fn with_max_chunk_chars(mut self, max_chunk_chars: usize) -> Self {
        self.max_chunk_chars = max_chunk_chars;
        self
    }

    /// Whether an ingestion is currently running.
    #[must_use]
    pub fn is_ingesting(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Ingest one uploaded document.
    ///
    /// Rejects with [`KbError::IngestionBusy`] when another ingestion is in
    /// flight. Validation failures (format, encoding, empty text) surface
    /// before any document row is created; failures after that point mark
    /// the document `Error` and leave no searchable chunks behind.
    #[instrument(skip(self, bytes), fields(filename = %filename, bytes = bytes.len()))]
    pub async fn ingest(
        &self,
        filename: &str,
        bytes: &[u8],
        declared: &str,
    ) -> Result<IngestReport, KbError> {
        let kind = DocumentKind::from_declared(declared)?;
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(KbError::IngestionBusy);
        }
        let result = self.ingest_locked(filename, bytes, kind).await;
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    /// Delete a document and its chunks. Returns the number of chunks
    /// removed.
    pub async fn delete(&self, document_id: &str) -> Result<usize, KbError> {
        self.store.delete_document(document_id).await
    }

    async fn ingest_locked(
        &self,
        filename: &str,
        bytes: &[u8],
        _kind: DocumentKind,
    ) -> Result<IngestReport, KbError> {
        let text = std::str::from_utf8(bytes).map_err(|_| KbError::InvalidEncoding)?;
        if text.trim().is_empty() {
            return Err(KbError::EmptyDocument);
        }

        let document = KbDocument::new(filename);
        let document_id = document.id.clone();
        self.store.insert_document(document).await?;

        match self.chunk_and_store(&document_id, text).await {
            Ok(chunk_count) => {
                self.store
                    .set_status(&document_id, DocumentStatus::Complete, chunk_count)
                    .await?;
                info!(%document_id, chunk_count, "document ingested");
                Ok(IngestReport {
                    document_id,
                    chunk_count,
                })
            }
            Err(err) => {
                warn!(%document_id, error = %err, "ingestion failed, marking document");
                if let Err(status_err) = self
                    .store
                    .set_status(&document_id, DocumentStatus::Error, 0)
                    .await
                {
                    warn!(%document_id, error = %status_err, "failed to record error status");
                }
                Err(err)
            }
        }
    }

    async fn chunk_and_store(&self, document_id: &str, text: &str) -> Result<usize, KbError> {
        let pieces = chunk_text_with(text, self.max_chunk_chars);
        if pieces.is_empty() {
            return Err(KbError::EmptyDocument);
        }

        // Embed in bounded sub-batches; the embedding service caps request
        // sizes well below what a large document can produce.
        let batches = try_join_all(
            pieces
                .chunks(EMBED_BATCH)
                .map(|batch| self.embeddings.embed_batch(batch)),
        )
        .await?;
        let embeddings: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
        if embeddings.len() != pieces.len() {
            return Err(KbError::Embedding(crate::error::EmbeddingError::EmptyResponse));
        }

        let chunks: Vec<StoredChunk> = pieces
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (piece, embedding))| {
                StoredChunk::new(document_id, index, piece, embedding)
            })
            .collect();
        let chunk_count = chunks.len();
        self.store.insert_chunks(chunks).await?;
        Ok(chunk_count)
    }
}
