//! In-memory [`VectorStore`] implementation for tests and ephemeral indexes.
//!
//! Records live in a `BTreeMap` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over all stored vectors.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ChunkRef, ScoredChunk, VectorRecord};

use super::{rank, VectorStore};

/// In-memory vector store.
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<BTreeMap<ChunkRef, VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory vector store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn replace_source(&self, source_id: &str, records: &[VectorRecord]) -> Result<()> {
        let mut stored = self.records.write().map_err(poisoned)?;
        stored.retain(|key, _| key.source_id != source_id);
        for record in records {
            stored.insert(record.chunk.chunk_ref(), record.clone());
        }
        Ok(())
    }

    async fn replace_all(&self, records: &[VectorRecord]) -> Result<()> {
        let mut stored = self.records.write().map_err(poisoned)?;
        stored.clear();
        for record in records {
            stored.insert(record.chunk.chunk_ref(), record.clone());
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let stored = self.records.read().map_err(poisoned)?;
        let scored = stored
            .values()
            .map(|r| ScoredChunk {
                source_id: r.chunk.source_id.clone(),
                sequence_index: r.chunk.sequence_index,
                text: r.chunk.text.clone(),
                score: cosine_similarity(query, &r.vector),
            })
            .collect();
        Ok(rank(scored, limit))
    }

    async fn chunks_for(&self, source_id: &str) -> Result<Vec<Chunk>> {
        let stored = self.records.read().map_err(poisoned)?;
        Ok(stored
            .values()
            .filter(|r| r.chunk.source_id == source_id)
            .map(|r| r.chunk.clone())
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source_id: &str, seq: usize, text: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            chunk: Chunk {
                source_id: source_id.to_string(),
                sequence_index: seq,
                text: text.to_string(),
                start_offset: 0,
                end_offset: text.chars().count(),
                hash: String::new(),
            },
            vector,
        }
    }

    #[tokio::test]
    async fn test_replace_source_drops_stale_chunks() {
        let store = InMemoryVectorStore::new();
        store
            .replace_source(
                "a",
                &[
                    record("a", 0, "one", vec![1.0, 0.0]),
                    record("a", 1, "two", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        store
            .replace_source("b", &[record("b", 0, "other", vec![1.0, 1.0])])
            .await
            .unwrap();
        store
            .replace_source("a", &[record("a", 0, "fresh", vec![1.0, 0.0])])
            .await
            .unwrap();

        let chunks = store.chunks_for("a").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "fresh");
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = InMemoryVectorStore::new();
        store
            .replace_all(&[
                record("a", 0, "x axis", vec![1.0, 0.0]),
                record("b", 0, "y axis", vec![0.0, 1.0]),
                record("c", 0, "diagonal", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_id, "a");
        assert_eq!(hits[1].source_id, "c");
    }

    #[tokio::test]
    async fn test_replace_all_clears_previous_contents() {
        let store = InMemoryVectorStore::new();
        store
            .replace_source("a", &[record("a", 0, "old", vec![1.0])])
            .await
            .unwrap();
        store
            .replace_all(&[record("b", 0, "new", vec![1.0])])
            .await
            .unwrap();
        assert!(store.chunks_for("a").await.unwrap().is_empty());
        assert_eq!(store.len().await.unwrap(), 1);
    }
}
