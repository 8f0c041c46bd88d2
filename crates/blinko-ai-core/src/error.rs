//! Error types shared between the core and the network-backed clients.

use thiserror::Error;

/// A failure reported by an embedding, inference, or audio backend.
///
/// Covers network, authentication, quota, and malformed-response errors.
/// Nothing in the pipeline retries on this error; it is surfaced to the
/// immediate caller as-is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{provider} request failed{}: {message}", status_suffix(.http_status))]
pub struct ProviderError {
    /// Provider kind tag (e.g. `"openai"`, `"ollama"`).
    pub provider: String,
    /// HTTP status code, when the backend answered at all.
    pub http_status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            http_status: None,
            message: message.into(),
        }
    }

    pub fn with_status(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            http_status: Some(status),
            message: message.into(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}
