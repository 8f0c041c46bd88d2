//! Model capability registry.
//!
//! Maps an opaque, provider-specific model key to the set of functional
//! capabilities it supports. Capabilities are declarative hints used for
//! routing and for the settings UI; backends do not enforce them.
//!
//! Lookup order:
//!
//! 1. Entries registered at runtime via [`CapabilityRegistry::register`].
//! 2. The built-in table of well-known models.
//! 3. Inference from the model key itself (see [`infer_capabilities`]).
//!
//! ```rust
//! use blinko_ai_core::capability::{Capability, CapabilityRegistry};
//!
//! let registry = CapabilityRegistry::builtin();
//! let model = registry.lookup("text-embedding-3-small");
//! assert!(model.supports(Capability::Embedding));
//! assert_eq!(model.embedding_dimensions, 1536);
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// A functional trait a model may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Inference,
    Tools,
    Image,
    ImageGeneration,
    Video,
    Audio,
    Embedding,
    Rerank,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Inference => "inference",
            Capability::Tools => "tools",
            Capability::Image => "image",
            Capability::ImageGeneration => "imageGeneration",
            Capability::Video => "video",
            Capability::Audio => "audio",
            Capability::Embedding => "embedding",
            Capability::Rerank => "rerank",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type CapabilitySet = BTreeSet<Capability>;

/// Declarative description of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub model_key: String,
    pub capabilities: CapabilitySet,
    /// Embedding vector size; `0` means unknown (detected on first use).
    #[serde(default)]
    pub embedding_dimensions: usize,
}

impl ModelDescriptor {
    pub fn new(model_key: impl Into<String>, capabilities: &[Capability]) -> Self {
        Self {
            model_key: model_key.into(),
            capabilities: capabilities.iter().copied().collect(),
            embedding_dimensions: 0,
        }
    }

    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.embedding_dimensions = dims;
        self
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

use Capability::*;

/// Well-known models: (key, capabilities, embedding dimensions).
const BUILTIN_MODELS: &[(&str, &[Capability], usize)] = &[
    // OpenAI
    ("gpt-4o", &[Inference, Tools, Image], 0),
    ("gpt-4o-mini", &[Inference, Tools, Image], 0),
    ("gpt-4.1", &[Inference, Tools, Image], 0),
    ("gpt-4.1-mini", &[Inference, Tools, Image], 0),
    ("o3-mini", &[Inference, Tools], 0),
    ("gpt-3.5-turbo", &[Inference, Tools], 0),
    ("text-embedding-3-small", &[Embedding], 1536),
    ("text-embedding-3-large", &[Embedding], 3072),
    ("text-embedding-ada-002", &[Embedding], 1536),
    ("whisper-1", &[Audio], 0),
    ("gpt-4o-transcribe", &[Audio], 0),
    ("dall-e-3", &[ImageGeneration], 0),
    ("gpt-image-1", &[ImageGeneration], 0),
    // Voyage
    ("voyage-3", &[Embedding], 1024),
    ("voyage-3-large", &[Embedding], 1024),
    ("voyage-3-lite", &[Embedding], 512),
    ("voyage-code-3", &[Embedding], 1024),
    ("rerank-2", &[Rerank], 0),
    // Ollama
    ("nomic-embed-text", &[Embedding], 768),
    ("mxbai-embed-large", &[Embedding], 1024),
    ("bge-m3", &[Embedding], 1024),
    ("all-minilm", &[Embedding], 384),
    ("llama3.1", &[Inference, Tools], 0),
    ("llama3.2-vision", &[Inference, Image], 0),
    ("qwen2.5", &[Inference, Tools], 0),
];

/// Registry of model descriptors keyed by model key.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    models: HashMap<String, ModelDescriptor>,
}

impl CapabilityRegistry {
    /// An empty registry; every lookup falls back to inference.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the built-in model table.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (key, caps, dims) in BUILTIN_MODELS {
            registry.register(ModelDescriptor::new(*key, caps).with_dimensions(*dims));
        }
        registry
    }

    /// Register (or replace) a descriptor.
    pub fn register(&mut self, descriptor: ModelDescriptor) {
        self.models.insert(descriptor.model_key.clone(), descriptor);
    }

    /// Exact lookup without inference.
    pub fn get(&self, model_key: &str) -> Option<&ModelDescriptor> {
        self.models.get(model_key)
    }

    /// Resolve a descriptor for any model key.
    ///
    /// Tagged keys such as `nomic-embed-text:latest` match their untagged
    /// entry. Keys with no entry get inferred capabilities and unknown
    /// dimensions.
    pub fn lookup(&self, model_key: &str) -> ModelDescriptor {
        if let Some(found) = self.models.get(model_key) {
            return found.clone();
        }
        let untagged = model_key.split(':').next().unwrap_or(model_key);
        if let Some(found) = self.models.get(untagged) {
            return ModelDescriptor {
                model_key: model_key.to_string(),
                ..found.clone()
            };
        }
        ModelDescriptor {
            model_key: model_key.to_string(),
            capabilities: infer_capabilities(model_key),
            embedding_dimensions: 0,
        }
    }

    pub fn supports(&self, model_key: &str, capability: Capability) -> bool {
        self.lookup(model_key).supports(capability)
    }

    /// All registered descriptors declaring `capability`, sorted by key.
    pub fn models_with(&self, capability: Capability) -> Vec<&ModelDescriptor> {
        let mut found: Vec<&ModelDescriptor> = self
            .models
            .values()
            .filter(|d| d.supports(capability))
            .collect();
        found.sort_by(|a, b| a.model_key.cmp(&b.model_key));
        found
    }

    /// Every registered descriptor, sorted by key.
    pub fn models(&self) -> Vec<&ModelDescriptor> {
        let mut all: Vec<&ModelDescriptor> = self.models.values().collect();
        all.sort_by(|a, b| a.model_key.cmp(&b.model_key));
        all
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Guess capabilities from a model key's naming conventions.
pub fn infer_capabilities(model_key: &str) -> CapabilitySet {
    let key = model_key.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| key.contains(n));

    let mut caps = CapabilitySet::new();
    if has(&["embed", "bge-", "e5-", "minilm"]) {
        caps.insert(Embedding);
    } else if has(&["rerank"]) {
        caps.insert(Rerank);
    } else if has(&["whisper", "transcribe", "tts", "speech"]) {
        caps.insert(Audio);
    } else if has(&["dall-e", "gpt-image", "flux", "stable-diffusion", "sdxl", "imagen"]) {
        caps.insert(ImageGeneration);
    } else {
        caps.insert(Inference);
        if has(&["gpt-4", "gpt-5", "o1", "o3", "o4", "claude", "gemini", "qwen", "mistral", "llama3", "deepseek"]) {
            caps.insert(Tools);
        }
        if has(&["vision", "gpt-4o", "gpt-4.1", "claude-3", "gemini", "llava", "-vl"]) {
            caps.insert(Image);
        }
        if has(&["gemini-1.5", "gemini-2"]) {
            caps.insert(Video);
        }
    }
    caps
}
