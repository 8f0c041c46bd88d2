//! Core data models used throughout the assistant.
//!
//! These types represent the documents, chunks, and embeddings that flow
//! through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A note (or any other text) handed to the pipeline for indexing.
#[derive(Debug, Clone)]
pub struct Document {
    /// Stable identifier of the document within the corpus.
    pub source_id: String,
    pub title: Option<String>,
    pub body: String,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(source_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            title: None,
            body: body.into(),
            updated_at: Utc::now(),
        }
    }
}

/// A bounded slice of a document's text.
///
/// `sequence_index` is strictly increasing per `source_id`, starting at 0.
/// Offsets are character (not byte) positions into the document body,
/// `start_offset` inclusive and `end_offset` exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub source_id: String,
    pub sequence_index: usize,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

impl Chunk {
    pub fn chunk_ref(&self) -> ChunkRef {
        ChunkRef {
            source_id: self.source_id.clone(),
            sequence_index: self.sequence_index,
        }
    }
}

/// The `(source_id, sequence_index)` key a chunk is indexed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChunkRef {
    pub source_id: String,
    pub sequence_index: usize,
}

/// An embedding vector tied to the chunk it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    pub chunk_ref: ChunkRef,
    pub vector: Vec<f32>,
}

impl EmbeddingVector {
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// A chunk together with its embedding, as stored in the index.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

impl VectorRecord {
    pub fn embedding(&self) -> EmbeddingVector {
        EmbeddingVector {
            chunk_ref: self.chunk.chunk_ref(),
            vector: self.vector.clone(),
        }
    }
}

/// A chunk returned from a similarity query, annotated with provenance.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub source_id: String,
    pub sequence_index: usize,
    pub text: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}
