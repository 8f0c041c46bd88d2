//! Client for the note service's mutation endpoints.
//!
//! Tools never talk to note storage directly; every mutation goes through
//! [`NoteMutationApi`] carrying the impersonated [`CallerContext`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use super::batch_update::{NoteType, TriState};
use super::CallerContext;
use crate::http::{error_message, SharedFetch};

pub const IMPERSONATE_ACCOUNT_HEADER: &str = "x-impersonate-account";
pub const IMPERSONATE_ROLE_HEADER: &str = "x-impersonate-role";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NoteApiError {
    #[error("note service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("note service request failed: {0}")]
    Transport(String),
    #[error("invalid note service response: {0}")]
    Decode(String),
}

/// One note update as sent to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteUpsert {
    pub id: i64,
    pub content: String,
    pub note_type: NoteType,
    pub is_archived: TriState,
    pub is_top: TriState,
    pub is_share: TriState,
    pub is_recycle: TriState,
}

impl NoteUpsert {
    /// Request body; unset flags are left out so the service keeps them.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "id": self.id,
            "content": self.content,
            "type": self.note_type.code(),
        });
        let flags = [
            ("isArchived", self.is_archived),
            ("isTop", self.is_top),
            ("isShare", self.is_share),
            ("isRecycle", self.is_recycle),
        ];
        for (key, flag) in flags {
            if let Some(value) = flag.as_option() {
                body[key] = json!(value);
            }
        }
        body
    }
}

#[async_trait]
pub trait NoteMutationApi: Send + Sync {
    /// Move every note in `ids` owned by the caller to the trash.
    async fn trash_many(&self, caller: &CallerContext, ids: &[i64]) -> Result<(), NoteApiError>;

    /// Apply one update and return the updated note.
    async fn upsert(&self, caller: &CallerContext, note: &NoteUpsert) -> Result<Value, NoteApiError>;
}

/// HTTP implementation against the note service's REST API.
pub struct HttpNoteApi {
    base_url: String,
    token: String,
    fetch: Arc<SharedFetch>,
}

impl HttpNoteApi {
    pub fn new(base_url: &str, token: &str, fetch: Arc<SharedFetch>) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: token.to_string(),
            fetch,
        }
    }

    async fn post(&self, caller: &CallerContext, path: &str, body: &Value) -> Result<Value, NoteApiError> {
        let client = self
            .fetch
            .client()
            .await
            .map_err(|e| NoteApiError::Transport(e.message))?;

        let response = client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header(IMPERSONATE_ACCOUNT_HEADER, &caller.account_id)
            .header(IMPERSONATE_ROLE_HEADER, caller.role.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| NoteApiError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| NoteApiError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(NoteApiError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| NoteApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl NoteMutationApi for HttpNoteApi {
    async fn trash_many(&self, caller: &CallerContext, ids: &[i64]) -> Result<(), NoteApiError> {
        self.post(caller, "/api/v1/note/batch-trash", &json!({ "ids": ids }))
            .await
            .map(|_| ())
    }

    async fn upsert(&self, caller: &CallerContext, note: &NoteUpsert) -> Result<Value, NoteApiError> {
        self.post(caller, "/api/v1/note/upsert", &note.to_body()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_body_omits_unset_flags() {
        let note = NoteUpsert {
            id: 9,
            content: "buy milk".to_string(),
            note_type: NoteType::Todo,
            is_archived: TriState::Unset,
            is_top: TriState::True,
            is_share: TriState::False,
            is_recycle: TriState::Unset,
        };
        assert_eq!(
            note.to_body(),
            json!({"id": 9, "content": "buy milk", "type": 2, "isTop": true, "isShare": false})
        );
    }
}
