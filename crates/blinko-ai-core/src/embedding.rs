//! Embedding client trait and vector utilities.
//!
//! Defines the [`EmbeddingClient`] trait that all embedding backends
//! implement, plus pure helper functions for vector serialization and
//! similarity computation.
//!
//! Concrete HTTP clients (OpenAI-compatible, Azure OpenAI, Voyage, Ollama)
//! live in the `blinko-ai` crate and are built by its provider resolver.

use async_trait::async_trait;

use crate::error::ProviderError;

/// A backend that turns texts into embedding vectors.
///
/// # Contract
///
/// - One vector per input text, in input order.
/// - When [`dims`](EmbeddingClient::dims) is non-zero, every vector has
///   exactly that many components.
/// - Any backend failure fails the whole call with a [`ProviderError`].
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Provider kind tag (e.g. `"openai"`).
    fn provider(&self) -> &str;
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the configured dimensionality, or `0` when unknown.
    fn dims(&self) -> usize;
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Check the one-to-one and dimension post-conditions of an embed call.
///
/// Used by every client implementation after decoding a response.
pub fn check_embeddings(
    provider: &str,
    expected_count: usize,
    expected_dims: usize,
    vectors: &[Vec<f32>],
) -> Result<(), ProviderError> {
    if vectors.len() != expected_count {
        return Err(ProviderError::new(
            provider,
            format!(
                "backend returned {} embeddings for {} inputs",
                vectors.len(),
                expected_count
            ),
        ));
    }
    if expected_dims > 0 {
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != expected_dims) {
            return Err(ProviderError::new(
                provider,
                format!(
                    "embedding {} has dimension {}, expected {}",
                    i,
                    v.len(),
                    expected_dims
                ),
            ));
        }
    }
    Ok(())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use blinko_ai_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
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

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
