//! SQLite-backed chunk store (feature `sqlite`).
//!
//! Persists the local corpus across restarts. The schema is created on
//! connect (idempotent `CREATE TABLE IF NOT EXISTS`), and embeddings are
//! stored as little-endian `f32` BLOBs; similarity search is an O(n) scan
//! in Rust, so the database never needs to understand the vectors.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::instrument;

use crate::error::KbError;
use crate::kb::store::{ChunkStore, DocumentStatus, KbDocument, StoredChunk};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        filename TEXT NOT NULL,
        status TEXT NOT NULL,
        chunk_count INTEGER NOT NULL DEFAULT 0,
        uploaded_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS chunks (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        content TEXT NOT NULL,
        embedding BLOB NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)",
];

/// Encode an embedding as little-endian `f32` bytes for BLOB storage.
#[must_use]
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode a BLOB back into an embedding. Trailing bytes that do not form
/// a whole `f32` are ignored.
#[must_use]
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

/// SQLite corpus store.
#[derive(Clone)]
pub struct SqliteChunkStore {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteChunkStore").finish()
    }
}

impl SqliteChunkStore {
    /// Open (or create) the database at `database_url` and ensure the
    /// schema exists. Example URL: `sqlite://corpus.db`.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, KbError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn row_to_document(row: &SqliteRow) -> KbDocument {
        let status: String = row.get("status");
        let chunk_count: i64 = row.get("chunk_count");
        let uploaded_at: DateTime<Utc> = row.get("uploaded_at");
        KbDocument {
            id: row.get("id"),
            filename: row.get("filename"),
            status: DocumentStatus::parse(&status),
            chunk_count: chunk_count.max(0) as usize,
            uploaded_at,
        }
    }

    fn row_to_chunk(row: &SqliteRow) -> StoredChunk {
        let chunk_index: i64 = row.get("chunk_index");
        let blob: Vec<u8> = row.get("embedding");
        StoredChunk {
            id: row.get("id"),
            document_id: row.get("document_id"),
            chunk_index: chunk_index.max(0) as usize,
            text: row.get("content"),
            embedding: blob_to_vec(&blob),
        }
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn insert_document(&self, document: KbDocument) -> Result<(), KbError> {
        sqlx::query(
            "INSERT INTO documents (id, filename, status, chunk_count, uploaded_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&document.id)
        .bind(&document.filename)
        .bind(document.status.as_str())
        .bind(document.chunk_count as i64)
        .bind(document.uploaded_at)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
        chunk_count: usize,
    ) -> Result<(), KbError> {
        let result = sqlx::query("UPDATE documents SET status = ?, chunk_count = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(chunk_count as i64)
            .bind(document_id)
            .execute(self.pool.as_ref())
            .await?;
        if result.rows_affected() == 0 {
            return Err(KbError::UnknownDocument {
                id: document_id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_chunks(&self, chunks: Vec<StoredChunk>) -> Result<(), KbError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for chunk in &chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, content, embedding)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.text)
            .bind(vec_to_blob(&chunk.embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, KbError> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let documents = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if documents == 0 {
            tx.rollback().await?;
            return Err(KbError::UnknownDocument {
                id: document_id.to_string(),
            });
        }
        tx.commit().await?;
        Ok(removed as usize)
    }

    async fn documents(&self) -> Result<Vec<KbDocument>, KbError> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY uploaded_at, id")
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(rows.iter().map(Self::row_to_document).collect())
    }

    async fn document(&self, document_id: &str) -> Result<Option<KbDocument>, KbError> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(row.as_ref().map(Self::row_to_document))
    }

    async fn scan_chunks(
        &self,
        scope: Option<&[String]>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredChunk>, KbError> {
        // An empty allow-list means "no restriction", same as None.
        let scope = scope.filter(|ids| !ids.is_empty());

        let mut sql = String::from(
            "SELECT c.id, c.document_id, c.chunk_index, c.content, c.embedding
             FROM chunks c
             JOIN documents d ON d.id = c.document_id
             WHERE d.status = 'complete'",
        );
        if let Some(ids) = scope {
            let placeholders = vec!["?"; ids.len()].join(", ");
            sql.push_str(&format!(" AND c.document_id IN ({placeholders})"));
        }
        sql.push_str(" ORDER BY c.document_id, c.chunk_index LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(ids) = scope {
            for id in ids {
                query = query.bind(id);
            }
        }
        let rows = query
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(rows.iter().map(Self::row_to_chunk).collect())
    }

    async fn chunk_count(&self) -> Result<usize, KbError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chunks")
            .fetch_one(self.pool.as_ref())
            .await?;
        let count: i64 = row.get("n");
        Ok(count.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_codec_round_trips() {
        let vector = vec![0.0f32, 1.5, -2.25, f32::MIN_POSITIVE];
        assert_eq!(blob_to_vec(&vec_to_blob(&vector)), vector);
    }

    #[test]
    fn blob_decode_ignores_trailing_bytes() {
        let mut blob = vec_to_blob(&[1.0, 2.0]);
        blob.push(0xFF);
        assert_eq!(blob_to_vec(&blob), vec![1.0, 2.0]);
    }

    async fn temp_store() -> (tempfile::TempDir, SqliteChunkStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/corpus.db", dir.path().display());
        let store = SqliteChunkStore::connect(&url).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn document_lifecycle_round_trips() {
        let (_dir, store) = temp_store().await;
        let document = KbDocument::new("notes.txt");
        let id = document.id.clone();
        store.insert_document(document).await.unwrap();

        store
            .insert_chunks(vec![
                StoredChunk::new(&id, 0, "first".into(), vec![1.0, 0.0]),
                StoredChunk::new(&id, 1, "second".into(), vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        store
            .set_status(&id, DocumentStatus::Complete, 2)
            .await
            .unwrap();

        let fetched = store.document(&id).await.unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::Complete);
        assert_eq!(fetched.chunk_count, 2);

        let chunks = store.scan_chunks(None, 0, 10).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, StoredChunk::chunk_id(&id, 0));
        assert_eq!(chunks[0].embedding, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn incomplete_documents_stay_hidden_from_scans() {
        let (_dir, store) = temp_store().await;
        let document = KbDocument::new("pending.txt");
        let id = document.id.clone();
        store.insert_document(document).await.unwrap();
        store
            .insert_chunks(vec![StoredChunk::new(&id, 0, "hidden".into(), vec![1.0])])
            .await
            .unwrap();

        assert!(store.scan_chunks(None, 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_and_reports_count() {
        let (_dir, store) = temp_store().await;
        let document = KbDocument::new("gone.txt");
        let id = document.id.clone();
        store.insert_document(document).await.unwrap();
        store
            .insert_chunks(vec![
                StoredChunk::new(&id, 0, "a".into(), vec![1.0]),
                StoredChunk::new(&id, 1, "b".into(), vec![1.0]),
                StoredChunk::new(&id, 2, "c".into(), vec![1.0]),
            ])
            .await
            .unwrap();
        store
            .set_status(&id, DocumentStatus::Complete, 3)
            .await
            .unwrap();

        assert_eq!(store.delete_document(&id).await.unwrap(), 3);
        assert_eq!(store.chunk_count().await.unwrap(), 0);
        assert!(store.document(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scoped_scan_filters_by_document() {
        let (_dir, store) = temp_store().await;
        let mut ids = Vec::new();
        for name in ["a.txt", "b.txt"] {
            let document = KbDocument::new(name);
            let id = document.id.clone();
            store.insert_document(document).await.unwrap();
            store
                .insert_chunks(vec![StoredChunk::new(&id, 0, name.into(), vec![1.0])])
                .await
                .unwrap();
            store
                .set_status(&id, DocumentStatus::Complete, 1)
                .await
                .unwrap();
            ids.push(id);
        }

        let scope = vec![ids[0].clone()];
        let scanned = store.scan_chunks(Some(&scope), 0, 10).await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].document_id, ids[0]);

        // Empty allow-list means unrestricted.
        let all = store.scan_chunks(Some(&[]), 0, 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
