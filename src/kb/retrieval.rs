//! Similarity search over the chunk corpus.
//!
//! Retrieval is a deliberate O(n) scan: the corpus is paged out of the
//! store in bounded batches, every chunk of every eligible document is
//! scored against the query embedding, and chunks at or above the
//! similarity threshold survive into a ranked top-K. No index structure is
//! built. For a personal KB the scan is cheap, and constant memory beats
//! index maintenance.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingClient;
use crate::error::KbError;
use crate::kb::store::ChunkStore;

/// Cosine similarity of two equal-dimension vectors.
///
/// Returns `0.0` when either vector has zero magnitude. Mismatched
/// dimensionality is a programming error: it trips a debug assertion and
/// degrades to `0.0` in release builds.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "embedding dimensionality mismatch");
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// One ranked retrieval hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub document_id: String,
    /// Filename of the owning document (falls back to the id when the
    /// document row vanished between scan and lookup).
    pub document_name: String,
    pub chunk_id: String,
    pub text: String,
    pub score: f32,
}

/// Result of a retrieval pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    /// Ranked hits, best first.
    pub matches: Vec<RetrievedChunk>,
    /// Whether anything cleared the threshold.
    pub matched: bool,
    /// Document name of the best hit.
    pub source: Option<String>,
}

impl RetrievalOutcome {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Best score, `0.0` when nothing matched.
    #[must_use]
    pub fn top_score(&self) -> f32 {
        self.matches.first().map(|hit| hit.score).unwrap_or(0.0)
    }

    /// Format the hits into a prompt context block, attributing each chunk
    /// to its source document and respecting a character cap.
    #[must_use]
    pub fn context_text(&self, max_chars: usize) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut total = 0usize;
        for (index, hit) in self.matches.iter().enumerate() {
            let part = format!(
                "[Source {}: {}]\n{}",
                index + 1,
                hit.document_name,
                hit.text.trim()
            );
            if total + part.len() > max_chars {
                break;
            }
            total += part.len();
            parts.push(part);
        }
        parts.join("\n\n---\n\n")
    }
}

/// Persona-scoped similarity search over a [`ChunkStore`].
pub struct Retriever {
    store: Arc<dyn ChunkStore>,
    embeddings: Arc<dyn EmbeddingClient>,
    config: RetrievalConfig,
}

impl Retriever {
    #[must_use]
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embeddings: Arc<dyn EmbeddingClient>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            config,
        }
    }

    /// Search the corpus for the query, restricted to `scope` document ids
    /// (empty scope = all complete documents).
    ///
    /// An empty corpus or a scope naming unknown documents yields an empty
    /// outcome, not an error. Embedding failures propagate so the caller
    /// can degrade to "no KB context".
    #[instrument(skip(self, query), fields(scope_len = scope.len()))]
    pub async fn search(&self, query: &str, scope: &[String]) -> Result<RetrievalOutcome, KbError> {
        self.ranked(query, scope, self.config.threshold).await
    }

    /// Debugging surface for the KB test-query interface: same ranking as
    /// [`search`](Self::search) but without the relevance threshold, so
    /// low-scoring corpora still show *something* to inspect.
    pub async fn test_query(&self, query: &str) -> Result<Vec<RetrievedChunk>, KbError> {
        Ok(self.ranked(query, &[], f32::MIN).await?.matches)
    }

    async fn ranked(
        &self,
        query: &str,
        scope: &[String],
        threshold: f32,
    ) -> Result<RetrievalOutcome, KbError> {
        if query.trim().is_empty() {
            return Ok(RetrievalOutcome::empty());
        }

        let query_vec = self.embeddings.embed_query(query).await?;
        let scope_filter = (!scope.is_empty()).then_some(scope);

        let mut hits: Vec<(String, String, usize, String, f32)> = Vec::new();
        let mut offset = 0usize;
        let batch_size = self.config.scan_batch.max(1);
        loop {
            let batch = self
                .store
                .scan_chunks(scope_filter, offset, batch_size)
                .await?;
            let batch_len = batch.len();
            for chunk in batch {
                let score = cosine_similarity(&query_vec, &chunk.embedding);
                if score >= threshold {
                    hits.push((chunk.document_id, chunk.id, chunk.chunk_index, chunk.text, score));
                }
            }
            offset += batch_len;
            if batch_len < batch_size {
                break;
            }
        }

        hits.sort_by(|a, b| b.4.partial_cmp(&a.4).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(self.config.top_k);
        debug!(hits = hits.len(), scanned = offset, "retrieval scan finished");

        // Resolve document names once per distinct document.
        let mut names: FxHashMap<String, String> = FxHashMap::default();
        for (document_id, ..) in &hits {
            if !names.contains_key(document_id) {
                let name = self
                    .store
                    .document(document_id)
                    .await?
                    .map(|d| d.filename)
                    .unwrap_or_else(|| document_id.clone());
                names.insert(document_id.clone(), name);
            }
        }

        let matches: Vec<RetrievedChunk> = hits
            .into_iter()
            .map(|(document_id, chunk_id, _, text, score)| RetrievedChunk {
                document_name: names
                    .get(&document_id)
                    .cloned()
                    .unwrap_or_else(|| document_id.clone()),
                document_id,
                chunk_id,
                text,
                score,
            })
            .collect();

        Ok(RetrievalOutcome {
            matched: !matches.is_empty(),
            source: matches.first().map(|hit| hit.document_name.clone()),
            matches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_a_vector_with_itself_is_one() {
        let v = vec![0.3, -0.7, 1.2, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_is_symmetric() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-2.0, 0.5, 0.1];
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
    }

    #[test]
    fn cosine_of_opposed_vectors_is_minus_one() {
        let a = vec![1.0, 1.0];
        let b = vec![-1.0, -1.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn context_text_attributes_and_caps() {
        let outcome = RetrievalOutcome {
            matches: vec![
                RetrievedChunk {
                    document_id: "d1".into(),
                    document_name: "pricing.md".into(),
                    chunk_id: "d1_0".into(),
                    text: "Enterprise tier starts at custom pricing.".into(),
                    score: 0.9,
                },
                RetrievedChunk {
                    document_id: "d2".into(),
                    document_name: "security.md".into(),
                    chunk_id: "d2_0".into(),
                    text: "SOC 2 Type II certified.".into(),
                    score: 0.8,
                },
            ],
            matched: true,
            source: Some("pricing.md".into()),
        };

        let full = outcome.context_text(10_000);
        assert!(full.contains("[Source 1: pricing.md]"));
        assert!(full.contains("[Source 2: security.md]"));
        assert!(full.contains("---"));

        // A tight cap keeps whole chunks only.
        let capped = outcome.context_text(80);
        assert!(capped.contains("pricing.md"));
        assert!(!capped.contains("security.md"));
    }

    #[test]
    fn empty_outcome_reports_no_match() {
        let outcome = RetrievalOutcome::empty();
        assert!(!outcome.matched);
        assert_eq!(outcome.top_score(), 0.0);
        assert!(outcome.source.is_none());
        assert!(outcome.context_text(1_000).is_empty());
    }
}
