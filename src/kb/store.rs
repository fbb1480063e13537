//! Chunk storage: the trait and the in-memory backend.
//!
//! [`ChunkStore`] is the seam between retrieval/ingestion and whatever
//! holds the corpus. [`MemoryChunkStore`] is always available and backs
//! tests and ephemeral sessions; the SQLite backend (feature `sqlite`)
//! persists the local corpus across restarts.
//!
//! A chunk never exists without its parent document, and only chunks whose
//! parent is `Complete` are visible to scans: a document mid-ingestion or
//! failed never leaks partial chunks into retrieval.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::KbError;

/// Lifecycle of an ingested document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Upload accepted, chunking/embedding in progress.
    Processing,
    /// Fully ingested; chunks are searchable.
    Complete,
    /// Ingestion failed; no chunks are searchable.
    Error,
}

impl DocumentStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Complete => "complete",
            DocumentStatus::Error => "error",
        }
    }

    /// Parse the persisted label; unknown labels map to `Error` so a
    /// corrupt row can never surface as searchable.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label {
            "processing" => DocumentStatus::Processing,
            "complete" => DocumentStatus::Complete,
            _ => DocumentStatus::Error,
        }
    }
}

/// Metadata row for an ingested document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KbDocument {
    pub id: String,
    pub filename: String,
    pub status: DocumentStatus,
    pub chunk_count: usize,
    pub uploaded_at: DateTime<Utc>,
}

impl KbDocument {
    /// Fresh document in `Processing` state with a generated id.
    #[must_use]
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            filename: filename.into(),
            status: DocumentStatus::Processing,
            chunk_count: 0,
            uploaded_at: Utc::now(),
        }
    }
}

/// One stored chunk with its embedding. Never mutated after insertion;
/// removed only when its parent document is deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// `"{document_id}_{chunk_index}"`, the chunk's stable identity.
    pub id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

impl StoredChunk {
    /// Compose the canonical chunk id.
    #[must_use]
    pub fn chunk_id(document_id: &str, index: usize) -> String {
        format!("{document_id}_{index}")
    }

    #[must_use]
    pub fn new(document_id: &str, index: usize, text: String, embedding: Vec<f32>) -> Self {
        Self {
            id: Self::chunk_id(document_id, index),
            document_id: document_id.to_string(),
            chunk_index: index,
            text,
            embedding,
        }
    }
}

/// Storage backend for the KB corpus.
///
/// `scan_chunks` is the retrieval entry point: it pages through the chunks
/// of `Complete` documents in a stable order so the caller can stream the
/// corpus in bounded batches without ever materializing all of it.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn insert_document(&self, document: KbDocument) -> Result<(), KbError>;

    /// Transition a document's status and record its final chunk count.
    async fn set_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
        chunk_count: usize,
    ) -> Result<(), KbError>;

    /// Insert a batch of chunks for a document mid-ingestion.
    async fn insert_chunks(&self, chunks: Vec<StoredChunk>) -> Result<(), KbError>;

    /// Delete a document and cascade to all its chunks. Returns the number
    /// of chunks removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize, KbError>;

    async fn documents(&self) -> Result<Vec<KbDocument>, KbError>;

    async fn document(&self, document_id: &str) -> Result<Option<KbDocument>, KbError>;

    /// Page through searchable chunks. `scope` restricts to the given
    /// document ids (ids absent from the corpus simply never match);
    /// `None` means every complete document.
    async fn scan_chunks(
        &self,
        scope: Option<&[String]>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredChunk>, KbError>;

    /// Total number of stored chunks (any status).
    async fn chunk_count(&self) -> Result<usize, KbError>;
}

#[derive(Default)]
struct MemoryInner {
    documents: Vec<KbDocument>,
    chunks: Vec<StoredChunk>,
}

/// In-memory corpus store. Reads are unrestricted; writers take the lock
/// briefly, so searches proceed during an ingestion of another document.
#[derive(Default)]
pub struct MemoryChunkStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryChunkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn insert_document(&self, document: KbDocument) -> Result<(), KbError> {
        self.inner.write().documents.push(document);
        Ok(())
    }

    async fn set_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
        chunk_count: usize,
    ) -> Result<(), KbError> {
        let mut inner = self.inner.write();
        let Some(document) = inner.documents.iter_mut().find(|d| d.id == document_id) else {
            return Err(KbError::UnknownDocument {
                id: document_id.to_string(),
            });
        };
        document.status = status;
        document.chunk_count = chunk_count;
        Ok(())
    }

    async fn insert_chunks(&self, chunks: Vec<StoredChunk>) -> Result<(), KbError> {
        self.inner.write().chunks.extend(chunks);
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, KbError> {
        let mut inner = self.inner.write();
        let before = inner.documents.len();
        inner.documents.retain(|d| d.id != document_id);
        if inner.documents.len() == before {
            return Err(KbError::UnknownDocument {
                id: document_id.to_string(),
            });
        }
        let chunks_before = inner.chunks.len();
        inner.chunks.retain(|c| c.document_id != document_id);
        Ok(chunks_before - inner.chunks.len())
    }

    async fn documents(&self) -> Result<Vec<KbDocument>, KbError> {
        Ok(self.inner.read().documents.clone())
    }

    async fn document(&self, document_id: &str) -> Result<Option<KbDocument>, KbError> {
        Ok(self
            .inner
            .read()
            .documents
            .iter()
            .find(|d| d.id == document_id)
            .cloned())
    }

    async fn scan_chunks(
        &self,
        scope: Option<&[String]>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredChunk>, KbError> {
        // An empty allow-list means "no restriction", same as None.
        let scope = scope.filter(|ids| !ids.is_empty());
        let inner = self.inner.read();
        let searchable: FxHashMap<&str, ()> = inner
            .documents
            .iter()
            .filter(|d| d.status == DocumentStatus::Complete)
            .filter(|d| match scope {
                Some(ids) => ids.iter().any(|id| id == &d.id),
                None => true,
            })
            .map(|d| (d.id.as_str(), ()))
            .collect();

        Ok(inner
            .chunks
            .iter()
            .filter(|c| searchable.contains_key(c.document_id.as_str()))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn chunk_count(&self) -> Result<usize, KbError> {
        Ok(self.inner.read().chunks.len())
    }
}
