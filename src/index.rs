//! Vector index lifecycle.
//!
//! [`IndexManager`] owns the one index handle of a process and moves it
//! through `Uninitialized → Rebuilding → Ready`. The first
//! [`get_index`](IndexManager::get_index) call rebuilds the index from the
//! whole corpus; later calls return the ready handle without doing any
//! work. [`rebuild`](IndexManager::rebuild) forces a fresh pass.
//!
//! # Concurrency
//!
//! All writers (rebuild, per-source upsert) serialize on one async mutex.
//! Concurrent first callers queue on that mutex and re-check the state
//! once they hold it, so N concurrent `get_index` calls run exactly one
//! rebuild. Readers never take the mutex: a query checks the state and
//! fails with [`IndexError::NotReady`] unless it is `Ready`.
//!
//! # Dimension lock
//!
//! The vector dimension is fixed for the lifetime of a manager, either
//! from configuration or from the first vector written. Any later vector
//! or query of a different length is rejected.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tokio::sync::{watch, Mutex};

use blinko_ai_core::chunk::Chunker;
use blinko_ai_core::embedding::EmbeddingClient;
use blinko_ai_core::error::ProviderError;
use blinko_ai_core::models::{Chunk, ScoredChunk, VectorRecord};
use blinko_ai_core::store::VectorStore;

use crate::corpus::Corpus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Uninitialized,
    Rebuilding,
    Ready,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Rebuilding => "rebuilding",
            Self::Ready => "ready",
        })
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index is not ready (state: {state})")]
    NotReady { state: IndexState },
    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding failed at chunk {sequence_index} of '{source_id}': {error}")]
    Embed {
        source_id: String,
        sequence_index: usize,
        error: ProviderError,
    },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("failed to read corpus: {0:#}")]
    Corpus(anyhow::Error),
    #[error("vector store error: {0:#}")]
    Store(anyhow::Error),
}

/// Embed chunks in sequential batches, keeping chunk order.
///
/// Any failed batch aborts the whole call and names the first chunk of
/// that batch; no records are returned for a partially embedded set.
pub async fn embed_chunks(
    embedder: &dyn EmbeddingClient,
    chunks: Vec<Chunk>,
    batch_size: usize,
) -> Result<Vec<VectorRecord>, IndexError> {
    let mut records = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embed_error = |error: ProviderError| IndexError::Embed {
            source_id: batch[0].source_id.clone(),
            sequence_index: batch[0].sequence_index,
            error,
        };

        let vectors = embedder.embed(&texts).await.map_err(embed_error)?;
        if vectors.len() != batch.len() {
            return Err(embed_error(ProviderError::new(
                embedder.provider(),
                format!("backend returned {} embeddings for {} inputs", vectors.len(), batch.len()),
            )));
        }

        records.extend(
            batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, vector)| VectorRecord { chunk, vector }),
        );
    }
    Ok(records)
}

/// Snapshot of the index for status reporting.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexStatus {
    pub state: String,
    pub dimension: Option<usize>,
    pub chunks: usize,
    pub rebuilds: u64,
}

pub struct IndexManager {
    store: Arc<dyn VectorStore>,
    corpus: Arc<dyn Corpus>,
    embedder: Arc<dyn EmbeddingClient>,
    chunker: Chunker,
    batch_size: usize,
    dimension: OnceLock<usize>,
    state: watch::Sender<IndexState>,
    writer: Mutex<()>,
    rebuilds: AtomicU64,
}

impl IndexManager {
    pub fn new(
        store: Arc<dyn VectorStore>,
        corpus: Arc<dyn Corpus>,
        embedder: Arc<dyn EmbeddingClient>,
        chunker: Chunker,
        batch_size: usize,
    ) -> Arc<Self> {
        let dimension = OnceLock::new();
        if embedder.dims() > 0 {
            let _ = dimension.set(embedder.dims());
        }
        let (state, _) = watch::channel(IndexState::Uninitialized);
        Arc::new(Self {
            store,
            corpus,
            embedder,
            chunker,
            batch_size: batch_size.max(1),
            dimension,
            state,
            writer: Mutex::new(()),
            rebuilds: AtomicU64::new(0),
        })
    }

    pub fn state(&self) -> IndexState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<IndexState> {
        self.state.subscribe()
    }

    /// The locked vector dimension, if one is known yet.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    /// Number of completed rebuilds since the manager was created.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::SeqCst)
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingClient> {
        &self.embedder
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn handle(self: &Arc<Self>) -> IndexHandle {
        IndexHandle {
            manager: Arc::clone(self),
        }
    }

    /// Return the ready handle, rebuilding first if the index has never
    /// been built (or a rebuild is in flight).
    pub async fn get_index(self: &Arc<Self>) -> Result<IndexHandle, IndexError> {
        if self.state() == IndexState::Ready {
            return Ok(self.handle());
        }

        let _writer = self.writer.lock().await;
        if self.state() != IndexState::Ready {
            self.rebuild_locked().await?;
        }
        Ok(self.handle())
    }

    /// Force a full rebuild from the current corpus.
    pub async fn rebuild(self: &Arc<Self>) -> Result<IndexHandle, IndexError> {
        let _writer = self.writer.lock().await;
        self.rebuild_locked().await?;
        Ok(self.handle())
    }

    /// Query the index. Fails with `NotReady` unless the state is `Ready`.
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        let state = self.state();
        if state != IndexState::Ready {
            return Err(IndexError::NotReady { state });
        }
        if let Some(expected) = self.dimension() {
            if vector.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }
        self.store.search(vector, k).await.map_err(IndexError::Store)
    }

    /// Replace every chunk stored for `source_id`.
    pub async fn upsert_source(&self, source_id: &str, records: &[VectorRecord]) -> Result<(), IndexError> {
        let _writer = self.writer.lock().await;
        let dimension = self.check_dimension(records)?;
        self.store
            .replace_source(source_id, records)
            .await
            .map_err(IndexError::Store)?;
        self.lock_dimension(dimension);
        Ok(())
    }

    /// Stored chunks of one source, in sequence order.
    pub async fn chunks_for(&self, source_id: &str) -> Result<Vec<Chunk>, IndexError> {
        self.store.chunks_for(source_id).await.map_err(IndexError::Store)
    }

    pub async fn status(&self) -> Result<IndexStatus, IndexError> {
        Ok(IndexStatus {
            state: self.state().to_string(),
            dimension: self.dimension(),
            chunks: self.store.len().await.map_err(IndexError::Store)?,
            rebuilds: self.rebuild_count(),
        })
    }

    /// Dimension shared by `records`, checked against the locked one.
    fn check_dimension(&self, records: &[VectorRecord]) -> Result<Option<usize>, IndexError> {
        let Some(first) = records.first() else {
            return Ok(None);
        };
        let expected = self.dimension().unwrap_or(first.vector.len());
        for record in records {
            let actual = record.vector.len();
            if actual != expected {
                return Err(IndexError::DimensionMismatch { expected, actual });
            }
        }
        Ok(Some(expected))
    }

    /// Caller must hold `writer` and have stored vectors of `dimension`.
    fn lock_dimension(&self, dimension: Option<usize>) {
        if let Some(dimension) = dimension {
            let _ = self.dimension.set(dimension);
        }
    }

    /// Caller must hold `writer`.
    async fn rebuild_locked(&self) -> Result<(), IndexError> {
        let previous = self.state.send_replace(IndexState::Rebuilding);
        tracing::info!(previous = %previous, "index rebuild started");

        match self.rebuild_contents().await {
            Ok((documents, chunks)) => {
                self.rebuilds.fetch_add(1, Ordering::SeqCst);
                self.state.send_replace(IndexState::Ready);
                tracing::info!(documents, chunks, "index rebuild finished");
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(previous);
                tracing::warn!(error = %e, state = %previous, "index rebuild failed");
                Err(e)
            }
        }
    }

    async fn rebuild_contents(&self) -> Result<(usize, usize), IndexError> {
        let documents = self.corpus.documents().await.map_err(IndexError::Corpus)?;

        let mut records = Vec::new();
        for doc in &documents {
            let chunks = self.chunker.split(&doc.source_id, &doc.body);
            records.extend(embed_chunks(self.embedder.as_ref(), chunks, self.batch_size).await?);
        }

        let dimension = self.check_dimension(&records)?;
        self.store.replace_all(&records).await.map_err(IndexError::Store)?;
        self.lock_dimension(dimension);
        Ok((documents.len(), records.len()))
    }
}

/// Shared handle to a ready index.
///
/// Handles from the same manager compare equal.
#[derive(Clone)]
pub struct IndexHandle {
    manager: Arc<IndexManager>,
}

impl IndexHandle {
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        self.manager.query(vector, k).await
    }

    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }
}

impl PartialEq for IndexHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.manager, &other.manager)
    }
}

impl fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexHandle")
            .field("state", &self.manager.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::StaticCorpus;
    use async_trait::async_trait;
    use blinko_ai_core::models::Document;
    use blinko_ai_core::store::memory::InMemoryVectorStore;

    /// Embeds text as `[len, 1.0, ...]` with a fixed dimension.
    struct LengthEmbedder {
        dims: usize,
    }

    #[async_trait]
    impl EmbeddingClient for LengthEmbedder {
        fn provider(&self) -> &str {
            "fake"
        }
        fn model_name(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![1.0; self.dims];
                    v[0] = t.len() as f32;
                    v
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingClient for FailingEmbedder {
        fn provider(&self) -> &str {
            "fake"
        }
        fn model_name(&self) -> &str {
            "broken"
        }
        fn dims(&self) -> usize {
            0
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Err(ProviderError::with_status("fake", 429, "quota exceeded"))
        }
    }

    fn manager(embedder: Arc<dyn EmbeddingClient>, docs: Vec<Document>) -> Arc<IndexManager> {
        IndexManager::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(StaticCorpus::new(docs)),
            embedder,
            Chunker::new(blinko_ai_core::chunk::ChunkStrategy::Markdown, 100, 10).unwrap(),
            4,
        )
    }

    #[tokio::test]
    async fn test_query_before_first_use_is_not_ready() {
        let m = manager(Arc::new(LengthEmbedder { dims: 3 }), vec![Document::new("a", "hello")]);
        let err = m.query(&[1.0, 1.0, 1.0], 5).await.unwrap_err();
        assert!(matches!(
            err,
            IndexError::NotReady {
                state: IndexState::Uninitialized
            }
        ));
    }

    #[tokio::test]
    async fn test_get_index_rebuilds_once() {
        let m = manager(Arc::new(LengthEmbedder { dims: 3 }), vec![Document::new("a", "hello")]);
        let first = m.get_index().await.unwrap();
        let second = m.get_index().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(m.rebuild_count(), 1);
        assert_eq!(m.state(), IndexState::Ready);

        let hits = first.query(&[5.0, 1.0, 1.0], 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_id, "a");

        m.rebuild().await.unwrap();
        assert_eq!(m.rebuild_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_first_rebuild_returns_to_uninitialized() {
        let m = manager(Arc::new(FailingEmbedder), vec![Document::new("a", "hello")]);
        let err = m.get_index().await.unwrap_err();
        match err {
            IndexError::Embed {
                source_id,
                sequence_index,
                error,
            } => {
                assert_eq!(source_id, "a");
                assert_eq!(sequence_index, 0);
                assert_eq!(error.http_status, Some(429));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(m.state(), IndexState::Uninitialized);
        assert_eq!(m.rebuild_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_corpus_is_ready_not_stale() {
        let m = manager(Arc::new(LengthEmbedder { dims: 3 }), vec![]);
        let handle = m.get_index().await.unwrap();
        assert!(handle.query(&[1.0, 1.0, 1.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_is_locked() {
        let m = manager(Arc::new(LengthEmbedder { dims: 3 }), vec![Document::new("a", "hello")]);
        let handle = m.get_index().await.unwrap();
        assert!(matches!(
            handle.query(&[1.0, 1.0], 3).await,
            Err(IndexError::DimensionMismatch { expected: 3, actual: 2 })
        ));

        let chunk = Chunker::markdown().split("b", "other").remove(0);
        let err = m
            .upsert_source(
                "b",
                &[VectorRecord {
                    chunk,
                    vector: vec![0.0; 4],
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, actual: 4 }));
    }

    /// Reports no dimension up front; returns 3-dimensional vectors.
    struct UndeclaredDimsEmbedder;

    #[async_trait]
    impl EmbeddingClient for UndeclaredDimsEmbedder {
        fn provider(&self) -> &str {
            "fake"
        }
        fn model_name(&self) -> &str {
            "undeclared"
        }
        fn dims(&self) -> usize {
            0
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|_| vec![0.5, 0.5, 0.5]).collect())
        }
    }

    /// In-memory store whose next `replace_all` fails when armed.
    struct FlakyStore {
        inner: InMemoryVectorStore,
        fail_next_write: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl VectorStore for FlakyStore {
        async fn replace_source(&self, source_id: &str, records: &[VectorRecord]) -> anyhow::Result<()> {
            self.inner.replace_source(source_id, records).await
        }
        async fn replace_all(&self, records: &[VectorRecord]) -> anyhow::Result<()> {
            if self.fail_next_write.swap(false, Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.replace_all(records).await
        }
        async fn search(&self, query: &[f32], limit: usize) -> anyhow::Result<Vec<ScoredChunk>> {
            self.inner.search(query, limit).await
        }
        async fn chunks_for(&self, source_id: &str) -> anyhow::Result<Vec<Chunk>> {
            self.inner.chunks_for(source_id).await
        }
        async fn len(&self) -> anyhow::Result<usize> {
            self.inner.len().await
        }
    }

    #[tokio::test]
    async fn test_failed_store_write_leaves_dimension_unlocked() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryVectorStore::new(),
            fail_next_write: std::sync::atomic::AtomicBool::new(true),
        });
        let corpus = Arc::new(StaticCorpus::new([Document::new("a", "hello")]));
        let m = IndexManager::new(
            store,
            corpus.clone(),
            Arc::new(UndeclaredDimsEmbedder),
            Chunker::markdown(),
            4,
        );

        let err = m.get_index().await.unwrap_err();
        assert!(matches!(err, IndexError::Store(_)));
        assert_eq!(m.dimension(), None);
        assert_eq!(m.state(), IndexState::Uninitialized);

        m.get_index().await.unwrap();
        assert_eq!(m.dimension(), Some(3));
    }

    #[tokio::test]
    async fn test_embed_chunks_preserves_order_across_batches() {
        let embedder = LengthEmbedder { dims: 2 };
        let text = "word ".repeat(200);
        let chunks = Chunker::new(blinko_ai_core::chunk::ChunkStrategy::Markdown, 50, 5)
            .unwrap()
            .split("doc", &text);
        let n = chunks.len();
        assert!(n > 3);

        let records = embed_chunks(&embedder, chunks, 3).await.unwrap();
        assert_eq!(records.len(), n);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.chunk.sequence_index, i);
            assert_eq!(record.vector[0], record.chunk.text.len() as f32);
        }
    }
}
