//! Chat-completion client used by the assistant's reasoning loop.

use serde::{Deserialize, Serialize};

use blinko_ai_core::error::ProviderError;

use super::{Backend, Operation, ProviderKind};
use crate::http::send_json;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug)]
pub struct InferenceClient {
    backend: Backend,
    model: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

impl InferenceClient {
    pub(crate) fn new(backend: Backend, model: &str) -> Self {
        Self {
            backend,
            model: model.to_string(),
        }
    }

    pub fn provider(&self) -> &str {
        self.backend.label()
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> String {
        self.backend.url(&self.model, Operation::ChatCompletions)
    }

    /// Run one non-streaming completion and return the assistant's reply.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let provider = self.backend.label();
        let client = self.backend.fetch.client().await?;
        let request = self.backend.authorize(client.post(self.endpoint()));

        if self.backend.kind == ProviderKind::Ollama {
            let body = serde_json::json!({
                "model": self.model,
                "messages": messages,
                "stream": false,
            });
            let response: OllamaChatResponse = send_json(provider, request.json(&body)).await?;
            return Ok(response.message.content);
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        let response: ChatCompletionResponse = send_json(provider, request.json(&body)).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::new(provider, "completion returned no choices"))
    }
}
