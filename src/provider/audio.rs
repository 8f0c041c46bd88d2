//! Speech-to-text client for voice notes.

use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use blinko_ai_core::error::ProviderError;

use super::{Backend, Operation};
use crate::http::send_json;

/// Language value that lets the backend detect the spoken language.
pub const AUTO_LANGUAGE: &str = "auto";

#[derive(Debug)]
pub struct AudioClient {
    backend: Backend,
    model: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl AudioClient {
    pub(crate) fn new(backend: Backend, model: &str) -> Self {
        Self {
            backend,
            model: model.to_string(),
        }
    }

    pub fn provider(&self) -> &str {
        self.backend.label()
    }

    pub fn endpoint(&self) -> String {
        self.backend.url(&self.model, Operation::AudioTranscriptions)
    }

    /// Transcribe an audio file. `language` of `None` or `"auto"` is omitted.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        language: Option<&str>,
    ) -> Result<String, ProviderError> {
        let provider = self.backend.label();
        let client = self.backend.fetch.client().await?;

        let mut form = Form::new()
            .part("file", Part::bytes(audio).file_name(file_name.to_string()))
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(lang) = language.filter(|l| !l.is_empty() && *l != AUTO_LANGUAGE) {
            form = form.text("language", lang.to_string());
        }

        let request = self.backend.authorize(client.post(self.endpoint())).multipart(form);
        let response: TranscriptionResponse = send_json(provider, request).await?;
        tracing::debug!(provider, chars = response.text.len(), "transcribed audio");
        Ok(response.text)
    }
}
