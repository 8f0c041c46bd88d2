//! HTTP embedding clients.
//!
//! [`OpenAiCompatibleEmbedder`] speaks the `/embeddings` wire format shared
//! by OpenAI, Azure OpenAI, Voyage, and any OpenAI-compatible gateway.
//! [`OllamaEmbedder`] speaks Ollama's `/api/embed`.

use async_trait::async_trait;
use serde::Deserialize;

use blinko_ai_core::embedding::{check_embeddings, EmbeddingClient};
use blinko_ai_core::error::ProviderError;

use super::{Backend, Operation, ProviderKind};
use crate::http::send_json;

pub struct OpenAiCompatibleEmbedder {
    backend: Backend,
    model: String,
    dims: usize,
}

impl OpenAiCompatibleEmbedder {
    pub(crate) fn new(backend: Backend, model: &str, dims: usize) -> Self {
        Self {
            backend,
            model: model.to_string(),
            dims,
        }
    }

    pub fn endpoint(&self) -> String {
        self.backend.url(&self.model, Operation::Embeddings)
    }

    fn request_body(&self, texts: &[String]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        // Only the text-embedding-3 family accepts a reduced dimension.
        if self.dims > 0
            && self.model.starts_with("text-embedding-3")
            && self.backend.kind != ProviderKind::Voyage
        {
            body["dimensions"] = serde_json::json!(self.dims);
        }
        body
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Order the `data` array by `index` so output matches input order.
fn into_ordered_vectors(mut data: Vec<EmbeddingDatum>) -> Vec<Vec<f32>> {
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    data.into_iter().map(|d| d.embedding).collect()
}

#[async_trait]
impl EmbeddingClient for OpenAiCompatibleEmbedder {
    fn provider(&self) -> &str {
        self.backend.label()
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let provider = self.backend.label();
        let client = self.backend.fetch.client().await?;
        let request = self
            .backend
            .authorize(client.post(self.endpoint()))
            .json(&self.request_body(texts));

        let response: EmbeddingResponse = send_json(provider, request).await?;
        let vectors = into_ordered_vectors(response.data);
        check_embeddings(provider, texts.len(), self.dims, &vectors)?;

        tracing::debug!(provider, model = %self.model, count = vectors.len(), "embedded batch");
        Ok(vectors)
    }
}

pub struct OllamaEmbedder {
    backend: Backend,
    model: String,
    dims: usize,
}

impl OllamaEmbedder {
    pub(crate) fn new(backend: Backend, model: &str, dims: usize) -> Self {
        Self {
            backend,
            model: model.to_string(),
            dims,
        }
    }

    pub fn endpoint(&self) -> String {
        self.backend.url(&self.model, Operation::Embeddings)
    }
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedder {
    fn provider(&self) -> &str {
        self.backend.label()
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let provider = self.backend.label();
        let client = self.backend.fetch.client().await?;
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self.backend.authorize(client.post(self.endpoint())).json(&body);

        let response: OllamaEmbedResponse = send_json(provider, request).await.map_err(|e| {
            if e.http_status.is_none() {
                ProviderError::new(
                    provider,
                    format!("{} (is Ollama running at {}?)", e.message, self.endpoint()),
                )
            } else {
                e
            }
        })?;
        check_embeddings(provider, texts.len(), self.dims, &response.embeddings)?;

        tracing::debug!(provider, model = %self.model, count = response.embeddings.len(), "embedded batch");
        Ok(response.embeddings)
    }
}
