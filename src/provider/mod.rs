//! Provider resolution: one construction path for every backend.
//!
//! [`ProviderResolver`] turns a [`ProviderConfig`] plus a [`ClientRole`]
//! into a capability-typed client. Dispatch goes through a table keyed by
//! [`ProviderKind`]; a kind tag that matches no entry is served by the
//! OpenAI-compatible `custom` entry instead of being rejected.
//!
//! | Kind | Auth | Endpoint | Roles |
//! |------|------|----------|-------|
//! | `openai` | Bearer | `base_url` or `https://api.openai.com/v1` | embedding, inference, audio |
//! | `azure-openai` | `api-key` header | `base_url` (required) + deployment path + `api-version` | embedding, inference, audio |
//! | `voyage` | Bearer | `https://api.voyageai.com/v1` (no override) | embedding |
//! | `ollama` | none | `base_url` (trimmed) or `http://localhost:11434` | embedding, inference |
//! | `custom` | Bearer | `base_url` or the OpenAI default | embedding, inference, audio |
//!
//! Resolution never touches the network. All clients share one
//! [`SharedFetch`], which is initialized on the first outbound call.

mod audio;
mod embedding;
mod inference;

pub use audio::AudioClient;
pub use embedding::{OllamaEmbedder, OpenAiCompatibleEmbedder};
pub use inference::{ChatMessage, InferenceClient};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use blinko_ai_core::capability::ModelDescriptor;
use blinko_ai_core::embedding::EmbeddingClient;

use crate::http::SharedFetch;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const VOYAGE_BASE_URL: &str = "https://api.voyageai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const AZURE_DEFAULT_API_VERSION: &str = "2024-10-21";

/// Backend credentials and endpoint as entered in settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Kind tag, e.g. `"openai"`. Unknown tags fall back to `custom`.
    pub kind: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default, rename = "baseURL")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

impl ProviderConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    AzureOpenAi,
    Voyage,
    Ollama,
    Custom,
}

impl ProviderKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "azure-openai" => Some(Self::AzureOpenAi),
            "voyage" => Some(Self::Voyage),
            "ollama" => Some(Self::Ollama),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure-openai",
            Self::Voyage => "voyage",
            Self::Ollama => "ollama",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientRole {
    Embedding,
    Inference,
    Audio,
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Embedding => "embedding",
            Self::Inference => "inference",
            Self::Audio => "audio",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("provider '{kind}' does not offer a {role} client")]
    UnsupportedRole { kind: ProviderKind, role: ClientRole },
    #[error("provider '{kind}' requires a base URL")]
    MissingEndpoint { kind: ProviderKind },
}

/// A resolved, capability-typed client.
pub enum ResolvedClient {
    Embedding(Arc<dyn EmbeddingClient>),
    Inference(InferenceClient),
    Audio(AudioClient),
}

#[derive(Debug, Clone)]
pub(crate) enum Auth {
    None,
    Bearer(String),
    ApiKeyHeader(String),
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Operation {
    Embeddings,
    ChatCompletions,
    AudioTranscriptions,
}

impl Operation {
    fn openai_path(&self) -> &'static str {
        match self {
            Self::Embeddings => "embeddings",
            Self::ChatCompletions => "chat/completions",
            Self::AudioTranscriptions => "audio/transcriptions",
        }
    }
}

/// Endpoint, credentials, and transport for one resolved backend.
#[derive(Clone)]
pub(crate) struct Backend {
    pub(crate) kind: ProviderKind,
    base_url: String,
    api_version: Option<String>,
    auth: Auth,
    pub(crate) fetch: Arc<SharedFetch>,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl Backend {
    pub(crate) fn label(&self) -> &'static str {
        self.kind.as_str()
    }

    pub(crate) fn url(&self, model: &str, op: Operation) -> String {
        match self.kind {
            ProviderKind::AzureOpenAi => format!(
                "{}/openai/deployments/{}/{}?api-version={}",
                self.base_url,
                model,
                op.openai_path(),
                self.api_version.as_deref().unwrap_or(AZURE_DEFAULT_API_VERSION)
            ),
            ProviderKind::Ollama => match op {
                Operation::Embeddings => format!("{}/api/embed", self.base_url),
                _ => format!("{}/api/chat", self.base_url),
            },
            _ => format!("{}/{}", self.base_url, op.openai_path()),
        }
    }

    pub(crate) fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Auth::None => request,
            Auth::Bearer(key) => request.bearer_auth(key),
            Auth::ApiKeyHeader(key) => request.header("api-key", key),
        }
    }
}

fn normalize_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn bearer(config: &ProviderConfig) -> Auth {
    match config.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Auth::Bearer(key.to_string()),
        _ => Auth::None,
    }
}

type BackendConstructor = fn(&ProviderConfig, Arc<SharedFetch>) -> Result<Backend, ResolveError>;

struct KindEntry {
    construct: BackendConstructor,
    roles: &'static [ClientRole],
}

const ALL_ROLES: &[ClientRole] = &[ClientRole::Embedding, ClientRole::Inference, ClientRole::Audio];

fn openai_backend(config: &ProviderConfig, fetch: Arc<SharedFetch>) -> Result<Backend, ResolveError> {
    Ok(Backend {
        kind: ProviderKind::OpenAi,
        base_url: normalize_base(config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL)),
        api_version: None,
        auth: bearer(config),
        fetch,
    })
}

fn azure_backend(config: &ProviderConfig, fetch: Arc<SharedFetch>) -> Result<Backend, ResolveError> {
    let base_url = config
        .base_url
        .as_deref()
        .map(normalize_base)
        .filter(|url| !url.is_empty())
        .ok_or(ResolveError::MissingEndpoint {
            kind: ProviderKind::AzureOpenAi,
        })?;
    Ok(Backend {
        kind: ProviderKind::AzureOpenAi,
        base_url,
        api_version: config.api_version.clone(),
        auth: Auth::ApiKeyHeader(config.api_key.clone().unwrap_or_default()),
        fetch,
    })
}

fn voyage_backend(config: &ProviderConfig, fetch: Arc<SharedFetch>) -> Result<Backend, ResolveError> {
    Ok(Backend {
        kind: ProviderKind::Voyage,
        base_url: VOYAGE_BASE_URL.to_string(),
        api_version: None,
        auth: bearer(config),
        fetch,
    })
}

fn ollama_backend(config: &ProviderConfig, fetch: Arc<SharedFetch>) -> Result<Backend, ResolveError> {
    let base_url = config
        .base_url
        .as_deref()
        .map(normalize_base)
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| OLLAMA_BASE_URL.to_string());
    Ok(Backend {
        kind: ProviderKind::Ollama,
        base_url,
        api_version: None,
        auth: bearer(config),
        fetch,
    })
}

fn custom_backend(config: &ProviderConfig, fetch: Arc<SharedFetch>) -> Result<Backend, ResolveError> {
    let base_url = config
        .base_url
        .as_deref()
        .map(normalize_base)
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
    Ok(Backend {
        kind: ProviderKind::Custom,
        base_url,
        api_version: None,
        auth: bearer(config),
        fetch,
    })
}

/// Registered map from provider kind to backend constructor.
pub struct ProviderResolver {
    table: HashMap<ProviderKind, KindEntry>,
    fetch: Arc<SharedFetch>,
}

impl ProviderResolver {
    pub fn new(fetch: Arc<SharedFetch>) -> Self {
        let mut table = HashMap::new();
        table.insert(
            ProviderKind::OpenAi,
            KindEntry {
                construct: openai_backend,
                roles: ALL_ROLES,
            },
        );
        table.insert(
            ProviderKind::AzureOpenAi,
            KindEntry {
                construct: azure_backend,
                roles: ALL_ROLES,
            },
        );
        table.insert(
            ProviderKind::Voyage,
            KindEntry {
                construct: voyage_backend,
                roles: &[ClientRole::Embedding],
            },
        );
        table.insert(
            ProviderKind::Ollama,
            KindEntry {
                construct: ollama_backend,
                roles: &[ClientRole::Embedding, ClientRole::Inference],
            },
        );
        table.insert(
            ProviderKind::Custom,
            KindEntry {
                construct: custom_backend,
                roles: ALL_ROLES,
            },
        );
        Self { table, fetch }
    }

    /// The kind that will serve `tag`; unknown tags map to `Custom`.
    pub fn effective_kind(&self, tag: &str) -> ProviderKind {
        match ProviderKind::from_tag(tag) {
            Some(kind) if self.table.contains_key(&kind) => kind,
            _ => {
                tracing::warn!(kind = %tag, "unrecognized provider kind, using the OpenAI-compatible client");
                ProviderKind::Custom
            }
        }
    }

    fn backend(&self, config: &ProviderConfig, role: ClientRole) -> Result<Backend, ResolveError> {
        let kind = self.effective_kind(&config.kind);
        let entry = self.table.get(&kind).or_else(|| self.table.get(&ProviderKind::Custom));
        let Some(entry) = entry else {
            return Err(ResolveError::UnsupportedRole { kind, role });
        };
        if !entry.roles.contains(&role) {
            return Err(ResolveError::UnsupportedRole { kind, role });
        }
        (entry.construct)(config, self.fetch.clone())
    }

    /// Resolve a client for any role.
    pub fn resolve(
        &self,
        config: &ProviderConfig,
        role: ClientRole,
        model: &ModelDescriptor,
    ) -> Result<ResolvedClient, ResolveError> {
        Ok(match role {
            ClientRole::Embedding => ResolvedClient::Embedding(self.resolve_embedding(config, model)?),
            ClientRole::Inference => ResolvedClient::Inference(self.resolve_inference(config, model)?),
            ClientRole::Audio => ResolvedClient::Audio(self.resolve_audio(config, model)?),
        })
    }

    pub fn resolve_embedding(
        &self,
        config: &ProviderConfig,
        model: &ModelDescriptor,
    ) -> Result<Arc<dyn EmbeddingClient>, ResolveError> {
        let backend = self.backend(config, ClientRole::Embedding)?;
        let client: Arc<dyn EmbeddingClient> = match backend.kind {
            ProviderKind::Ollama => Arc::new(OllamaEmbedder::new(
                backend,
                &model.model_key,
                model.embedding_dimensions,
            )),
            _ => Arc::new(OpenAiCompatibleEmbedder::new(
                backend,
                &model.model_key,
                model.embedding_dimensions,
            )),
        };
        Ok(client)
    }

    pub fn resolve_inference(
        &self,
        config: &ProviderConfig,
        model: &ModelDescriptor,
    ) -> Result<InferenceClient, ResolveError> {
        let backend = self.backend(config, ClientRole::Inference)?;
        Ok(InferenceClient::new(backend, &model.model_key))
    }

    pub fn resolve_audio(
        &self,
        config: &ProviderConfig,
        model: &ModelDescriptor,
    ) -> Result<AudioClient, ResolveError> {
        let backend = self.backend(config, ClientRole::Audio)?;
        Ok(AudioClient::new(backend, &model.model_key))
    }
}
