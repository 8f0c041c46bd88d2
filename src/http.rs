//! Shared outbound HTTP layer.
//!
//! Every provider client and the note API client issue requests through
//! one [`SharedFetch`], so cross-cutting settings (proxy, timeout) apply
//! uniformly regardless of backend. The underlying `reqwest::Client` is
//! built lazily, exactly once, the first time anyone asks for it.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use blinko_ai_core::error::ProviderError;

use crate::config::HttpConfig;

pub struct SharedFetch {
    settings: HttpConfig,
    client: OnceCell<reqwest::Client>,
}

impl SharedFetch {
    pub fn new(settings: HttpConfig) -> Self {
        Self {
            settings,
            client: OnceCell::new(),
        }
    }

    /// Build the HTTP client if that has not happened yet.
    ///
    /// Idempotent; concurrent callers wait for the same initialization.
    pub async fn initialize(&self) -> Result<(), ProviderError> {
        self.client().await.map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.client.initialized()
    }

    /// The shared client, initializing it on first use.
    pub async fn client(&self) -> Result<&reqwest::Client, ProviderError> {
        self.client
            .get_or_try_init(|| async { build_client(&self.settings) })
            .await
    }
}

fn build_client(settings: &HttpConfig) -> Result<reqwest::Client, ProviderError> {
    let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(settings.timeout_secs));
    if let Some(url) = &settings.proxy {
        let proxy = reqwest::Proxy::all(url.as_str())
            .map_err(|e| ProviderError::new("http", format!("invalid proxy '{}': {}", url, e)))?;
        builder = builder.proxy(proxy);
        tracing::debug!(proxy = %url, "outbound proxy enabled");
    }
    builder
        .build()
        .map_err(|e| ProviderError::new("http", format!("failed to build HTTP client: {}", e)))
}

/// Send a request and decode a JSON response body.
///
/// Non-2xx responses become a [`ProviderError`] carrying the status code
/// and the backend's error message when one can be extracted.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::new(provider, e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::with_status(
            provider,
            status.as_u16(),
            error_message(&body),
        ));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::new(provider, format!("invalid response body: {}", e)))
}

/// Pull a human-readable message out of an error body.
///
/// Understands `{"error": {"message": ..}}`, `{"error": ".."}`,
/// `{"detail": ".."}` and `{"message": ".."}`; falls back to the raw body.
pub(crate) fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|json| {
        json.pointer("/error/message")
            .or_else(|| json.get("error"))
            .or_else(|| json.get("detail"))
            .or_else(|| json.get("message"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    });
    match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => "empty response body".to_string(),
        None => body.trim().to_string(),
    }
}
