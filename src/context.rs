//! Process-scoped assistant context.
//!
//! [`AssistantContext`] owns everything that must exist once per process:
//! the shared HTTP layer, the provider resolver, the capability registry,
//! the store registry, and the lazily created index manager. Components
//! receive what they need from it at construction time.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::OnceCell;

use blinko_ai_core::capability::{CapabilityRegistry, ModelDescriptor};
use blinko_ai_core::models::Document;

use crate::config::Config;
use crate::corpus::{Corpus, FsCorpus, StaticCorpus};
use crate::http::SharedFetch;
use crate::index::IndexManager;
use crate::pipeline::RetrievalPipeline;
use crate::provider::ProviderResolver;
use crate::sqlite_store::StoreRegistry;
use crate::tools::{HttpNoteApi, ImpersonationPolicy, NoteMutationApi, ToolRegistry};

pub struct AssistantContext {
    config: Config,
    fetch: Arc<SharedFetch>,
    resolver: ProviderResolver,
    capabilities: CapabilityRegistry,
    stores: StoreRegistry,
    corpus: Arc<dyn Corpus>,
    index: OnceCell<Arc<IndexManager>>,
}

impl AssistantContext {
    /// Build a context whose corpus comes from the `[corpus]` section.
    ///
    /// Without a `[corpus]` section the corpus is empty, so a rebuild
    /// produces an empty index that ingest calls then fill.
    pub fn from_config(config: Config) -> Result<Self> {
        let corpus: Arc<dyn Corpus> = match &config.corpus {
            Some(corpus) => Arc::new(FsCorpus::new(corpus)?),
            None => {
                tracing::warn!("no [corpus] configured, index rebuilds start from an empty corpus");
                Arc::new(StaticCorpus::default())
            }
        };
        Ok(Self::with_corpus(config, corpus))
    }

    pub fn with_corpus(config: Config, corpus: Arc<dyn Corpus>) -> Self {
        let fetch = Arc::new(SharedFetch::new(config.http.clone()));
        Self {
            resolver: ProviderResolver::new(fetch.clone()),
            capabilities: CapabilityRegistry::builtin(),
            stores: StoreRegistry::new(),
            index: OnceCell::new(),
            config,
            fetch,
            corpus,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fetch(&self) -> &Arc<SharedFetch> {
        &self.fetch
    }

    pub fn resolver(&self) -> &ProviderResolver {
        &self.resolver
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    pub fn capabilities_mut(&mut self) -> &mut CapabilityRegistry {
        &mut self.capabilities
    }

    pub fn stores(&self) -> &StoreRegistry {
        &self.stores
    }

    /// Descriptor of the configured embedding model, with any `dims` override.
    pub fn embedding_model(&self) -> ModelDescriptor {
        let descriptor = self.capabilities.lookup(&self.config.embedding.model);
        match self.config.embedding.dims {
            Some(dims) => descriptor.with_dimensions(dims),
            None => descriptor,
        }
    }

    /// Load a note file for ingestion, keyed the way corpus rebuilds key it.
    ///
    /// With a `[corpus]` section the file must live under its root, so a
    /// later rebuild refreshes the same source instead of adding a second
    /// copy. Without one the source id is the canonical path, and the next
    /// rebuild drops the document.
    pub fn note_document(&self, path: &Path) -> Result<Document> {
        match &self.config.corpus {
            Some(corpus) => FsCorpus::new(corpus)?.document_for(path),
            None => {
                let file = path
                    .canonicalize()
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let body = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                tracing::warn!(
                    path = %file.display(),
                    "no [corpus] configured, ingested note will not survive the next rebuild"
                );
                Ok(Document::new(file.to_string_lossy(), body))
            }
        }
    }

    /// The process's index manager, created on first request.
    pub async fn index(&self) -> Result<Arc<IndexManager>> {
        self.index
            .get_or_try_init(|| async {
                let store = self.stores.open(&self.config.index.path).await?;
                let embedder = self
                    .resolver
                    .resolve_embedding(&self.config.embedding.provider_config(), &self.embedding_model())
                    .context("Failed to resolve embedding client")?;
                let chunker = self.config.chunking.chunker()?;
                Ok::<_, anyhow::Error>(IndexManager::new(
                    store,
                    self.corpus.clone(),
                    embedder,
                    chunker,
                    self.config.embedding.batch_size,
                ))
            })
            .await
            .cloned()
    }

    pub async fn pipeline(&self) -> Result<RetrievalPipeline> {
        Ok(RetrievalPipeline::new(self.index().await?))
    }

    /// Tool registry backed by the configured note service.
    pub fn tools(&self) -> Result<ToolRegistry> {
        let notes = self
            .config
            .notes
            .as_ref()
            .context("No [notes] section configured")?;
        let api: Arc<dyn NoteMutationApi> = Arc::new(HttpNoteApi::new(&notes.base_url, &notes.token, self.fetch.clone()));
        Ok(self.tools_with(api))
    }

    /// Tool registry over any note API, using the configured policy.
    pub fn tools_with(&self, api: Arc<dyn NoteMutationApi>) -> ToolRegistry {
        ToolRegistry::with_note_tools(api, ImpersonationPolicy::new(self.config.tools.impersonation_role))
    }
}
