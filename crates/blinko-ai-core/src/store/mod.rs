//! Storage abstraction for the vector index.
//!
//! The [`VectorStore`] trait defines the operations the index manager and
//! retrieval pipeline need, enabling pluggable backends (SQLite, in-memory).
//!
//! Records are keyed by `(source_id, sequence_index)`. Replacing a source
//! removes every chunk previously stored for it, so re-ingesting a document
//! never leaves stale or duplicate chunks behind.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, ScoredChunk, VectorRecord};

/// Abstract storage backend for embedded chunks.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`replace_source`](VectorStore::replace_source) | Swap all chunks of one document |
/// | [`replace_all`](VectorStore::replace_all) | Swap the entire index contents |
/// | [`search`](VectorStore::search) | Top-k cosine similarity search |
/// | [`chunks_for`](VectorStore::chunks_for) | Chunks of one document, in order |
/// | [`len`](VectorStore::len) | Number of stored chunks |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace every chunk stored for `source_id` with `records`.
    async fn replace_source(&self, source_id: &str, records: &[VectorRecord]) -> Result<()>;

    /// Replace the whole store with `records`.
    async fn replace_all(&self, records: &[VectorRecord]) -> Result<()>;

    /// Return up to `limit` chunks ordered by descending similarity.
    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>>;

    /// Return the chunks of `source_id` ordered by sequence index.
    async fn chunks_for(&self, source_id: &str) -> Result<Vec<Chunk>>;

    async fn len(&self) -> Result<usize>;
}

/// Order scored chunks by score (desc), then source id and sequence (asc).
pub fn rank(mut scored: Vec<ScoredChunk>, limit: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source_id.cmp(&b.source_id))
            .then_with(|| a.sequence_index.cmp(&b.sequence_index))
    });
    scored.truncate(limit);
    scored
}
