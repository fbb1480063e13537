#![allow(dead_code)]

//! Shared fixtures for the integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use cueline::embedding::EmbeddingClient;
use cueline::error::EmbeddingError;
use cueline::kb::store::{ChunkStore, DocumentStatus, KbDocument, MemoryChunkStore, StoredChunk};
use cueline::transcript::Utterance;

/// Embedding client with hand-assigned vectors, so tests control every
/// similarity score exactly. Unknown texts embed to the zero vector.
pub struct StaticEmbeddingClient {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl StaticEmbeddingClient {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), self.dimension, "fixture vector dimension");
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingClient for StaticEmbeddingClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                self.vectors
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; self.dimension])
            })
            .collect())
    }
}

/// Embedding client that always fails, for degradation tests.
pub struct FailingEmbeddingClient;

#[async_trait]
impl EmbeddingClient for FailingEmbeddingClient {
    fn dimension(&self) -> usize {
        2
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::EmptyResponse)
    }
}

/// Insert a complete document with pre-embedded chunks and return its id.
pub async fn seed_document(
    store: &MemoryChunkStore,
    filename: &str,
    chunks: &[(&str, Vec<f32>)],
) -> String {
    let document = KbDocument::new(filename);
    let id = document.id.clone();
    store.insert_document(document).await.unwrap();
    store
        .insert_chunks(
            chunks
                .iter()
                .enumerate()
                .map(|(index, (text, embedding))| {
                    StoredChunk::new(&id, index, (*text).to_string(), embedding.clone())
                })
                .collect(),
        )
        .await
        .unwrap();
    store
        .set_status(&id, DocumentStatus::Complete, chunks.len())
        .await
        .unwrap();
    id
}

/// A finished utterance fixture.
pub fn utterance(text: &str) -> Utterance {
    Utterance {
        text: text.to_string(),
        speaker: "Speaker 1".to_string(),
        is_final: true,
        is_speech_final: true,
        confidence: 0.92,
        timestamp_ms: 0,
    }
}

/// Unit vector whose cosine similarity against `[1, 0]` is exactly `score`.
pub fn vector_with_score(score: f32) -> Vec<f32> {
    vec![score, (1.0 - score * score).max(0.0).sqrt()]
}

pub fn arc_store(store: MemoryChunkStore) -> Arc<MemoryChunkStore> {
    Arc::new(store)
}
