//! Ingest and retrieval over the managed index.
//!
//! `ingest` chunks one document, embeds every chunk, and replaces the
//! document's previous chunks in a single store write. `retrieve` embeds
//! the query with the index's own embedding client and returns the top-k
//! chunks with their source ids.

use std::sync::Arc;

use blinko_ai_core::models::{Document, ScoredChunk};

use crate::index::{embed_chunks, IndexError, IndexManager};

/// Outcome of one `ingest` call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IngestReport {
    pub source_id: String,
    pub chunks: usize,
}

pub struct RetrievalPipeline {
    index: Arc<IndexManager>,
}

impl RetrievalPipeline {
    pub fn new(index: Arc<IndexManager>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<IndexManager> {
        &self.index
    }

    /// Index `document`, replacing any chunks stored for its source id.
    ///
    /// Nothing is written unless every chunk embeds successfully.
    pub async fn ingest(&self, document: &Document) -> Result<IngestReport, IndexError> {
        self.index.get_index().await?;

        let chunks = self.index.chunker().split(&document.source_id, &document.body);
        let records = embed_chunks(
            self.index.embedder().as_ref(),
            chunks,
            self.index.batch_size(),
        )
        .await?;

        self.index.upsert_source(&document.source_id, &records).await?;
        tracing::info!(source_id = %document.source_id, chunks = records.len(), "ingested document");

        Ok(IngestReport {
            source_id: document.source_id.clone(),
            chunks: records.len(),
        })
    }

    /// Top-`k` chunks most similar to `query`.
    ///
    /// Never fails with `NotReady`: a query racing a rebuild waits for it.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        let handle = self.index.get_index().await?;
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = self.index.embedder().embed(&[query.to_string()]).await?;
        let vector = vectors.pop().ok_or_else(|| {
            IndexError::Provider(blinko_ai_core::error::ProviderError::new(
                self.index.embedder().provider(),
                "no embedding returned for query",
            ))
        })?;

        // A rebuild started while the query was being embedded: wait for it
        // on the writer gate and query the fresh index.
        let hits = match handle.query(&vector, k).await {
            Err(IndexError::NotReady { state }) => {
                tracing::debug!(%state, "index busy, waiting for rebuild before querying");
                self.index.get_index().await?.query(&vector, k).await?
            }
            outcome => outcome?,
        };
        tracing::debug!(k, hits = hits.len(), "retrieved chunks");
        Ok(hits)
    }
}
