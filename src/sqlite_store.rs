//! SQLite-backed [`VectorStore`] and the per-path store registry.
//!
//! Each embedded chunk is one row of `chunk_vectors`, keyed by
//! `(source_id, sequence_index)`, with its vector stored as a
//! little-endian f32 BLOB. Search is a brute-force cosine scan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;

use blinko_ai_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use blinko_ai_core::models::{Chunk, ScoredChunk, VectorRecord};
use blinko_ai_core::store::{rank, VectorStore};

use crate::db;
use crate::migrate;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteVectorStore {
    /// Open (creating if missing) the index database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool)
            .await
            .with_context(|| format!("Failed to migrate index database: {}", path.display()))?;
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn insert_records(tx: &mut Transaction<'_, Sqlite>, records: &[VectorRecord]) -> Result<()> {
    for record in records {
        let chunk = &record.chunk;
        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (source_id, sequence_index, text, start_offset,
                                       end_offset, hash, dims, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id, sequence_index) DO UPDATE SET
                text = excluded.text,
                start_offset = excluded.start_offset,
                end_offset = excluded.end_offset,
                hash = excluded.hash,
                dims = excluded.dims,
                embedding = excluded.embedding
            "#,
        )
        .bind(&chunk.source_id)
        .bind(chunk.sequence_index as i64)
        .bind(&chunk.text)
        .bind(chunk.start_offset as i64)
        .bind(chunk.end_offset as i64)
        .bind(&chunk.hash)
        .bind(record.vector.len() as i64)
        .bind(vec_to_blob(&record.vector))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn row_to_chunk(row: &SqliteRow) -> Chunk {
    let sequence_index: i64 = row.get("sequence_index");
    let start_offset: i64 = row.get("start_offset");
    let end_offset: i64 = row.get("end_offset");
    Chunk {
        source_id: row.get("source_id"),
        sequence_index: sequence_index as usize,
        text: row.get("text"),
        start_offset: start_offset as usize,
        end_offset: end_offset as usize,
        hash: row.get("hash"),
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn replace_source(&self, source_id: &str, records: &[VectorRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        insert_records(&mut tx, records).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn replace_all(&self, records: &[VectorRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&mut *tx)
            .await?;
        insert_records(&mut tx, records).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT source_id, sequence_index, text, embedding FROM chunk_vectors",
        )
        .fetch_all(&self.pool)
        .await?;

        let scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let sequence_index: i64 = row.get("sequence_index");
                ScoredChunk {
                    source_id: row.get("source_id"),
                    sequence_index: sequence_index as usize,
                    text: row.get("text"),
                    score: cosine_similarity(query, &blob_to_vec(&blob)),
                }
            })
            .collect();

        Ok(rank(scored, limit))
    }

    async fn chunks_for(&self, source_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT source_id, sequence_index, text, start_offset, end_offset, hash
            FROM chunk_vectors
            WHERE source_id = ?
            ORDER BY sequence_index ASC
            "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

/// One open store per absolute index path, shared process-wide.
#[derive(Default)]
pub struct StoreRegistry {
    stores: Mutex<HashMap<PathBuf, Arc<SqliteVectorStore>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the store for `path`, opening it on first request.
    ///
    /// Relative and absolute spellings of the same path share one handle.
    pub async fn open(&self, path: &Path) -> Result<Arc<SqliteVectorStore>> {
        let key = std::path::absolute(path)
            .with_context(|| format!("Invalid index path: {}", path.display()))?;

        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(&key) {
            return Ok(store.clone());
        }

        let store = Arc::new(SqliteVectorStore::open(&key).await?);
        tracing::info!(path = %key.display(), "opened vector index");
        stores.insert(key, store.clone());
        Ok(store)
    }

    pub async fn len(&self) -> usize {
        self.stores.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blinko_ai_core::chunk::Chunker;

    fn records(source_id: &str, text: &str, vector: Vec<f32>) -> Vec<VectorRecord> {
        Chunker::markdown()
            .split(source_id, text)
            .into_iter()
            .map(|chunk| VectorRecord {
                chunk,
                vector: vector.clone(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_replace_source_drops_stale_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(&dir.path().join("index.sqlite"))
            .await
            .unwrap();

        let long = "alpha beta gamma. ".repeat(300);
        store
            .replace_source("note-1", &records("note-1", &long, vec![1.0, 0.0]))
            .await
            .unwrap();
        assert!(store.len().await.unwrap() > 1);

        store
            .replace_source("note-1", &records("note-1", "short now", vec![1.0, 0.0]))
            .await
            .unwrap();
        let chunks = store.chunks_for("note-1").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short now");
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(&dir.path().join("index.sqlite"))
            .await
            .unwrap();

        let mut all = records("a", "about cats", vec![1.0, 0.0]);
        all.extend(records("b", "about dogs", vec![0.0, 1.0]));
        store.replace_all(&all).await.unwrap();

        let hits = store.search(&[0.9, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_id, "a");
        assert!(hits[0].score > hits[1].score);
        assert!(store.search(&[1.0, 0.0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registry_shares_handles_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.sqlite");
        let registry = StoreRegistry::new();

        let first = registry.open(&path).await.unwrap();
        let second = registry.open(&path).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);

        let other = registry.open(&dir.path().join("other.sqlite")).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len().await, 2);
    }
}
