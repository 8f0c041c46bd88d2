use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use super::note_api::{NoteMutationApi, NoteUpsert};
use super::{CallerContext, NoteTool, ToolError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    #[default]
    Blinko,
    Note,
    Todo,
}

impl NoteType {
    /// Numeric type code used by the note service.
    pub fn code(&self) -> u8 {
        match self {
            Self::Blinko => 0,
            Self::Note => 1,
            Self::Todo => 2,
        }
    }
}

/// A flag update: set true, set false, or leave unchanged.
///
/// On the wire `true`/`false` set the flag and `null` or an absent field
/// leaves it unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum TriState {
    #[default]
    Unset,
    True,
    False,
}

impl TriState {
    pub fn as_option(&self) -> Option<bool> {
        match self {
            Self::Unset => None,
            Self::True => Some(true),
            Self::False => Some(false),
        }
    }

    pub fn is_unset(&self) -> bool {
        *self == Self::Unset
    }
}

impl From<Option<bool>> for TriState {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Self::Unset,
            Some(true) => Self::True,
            Some(false) => Self::False,
        }
    }
}

impl From<TriState> for Option<bool> {
    fn from(value: TriState) -> Self {
        value.as_option()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NoteUpdate {
    #[validate(range(min = 1, message = "note id must be positive"))]
    pub id: i64,
    pub content: String,
    #[serde(default, rename = "type")]
    pub note_type: NoteType,
    #[serde(default)]
    pub is_archived: TriState,
    #[serde(default)]
    pub is_top: TriState,
    #[serde(default)]
    pub is_share: TriState,
    #[serde(default)]
    pub is_recycle: TriState,
}

impl From<NoteUpdate> for NoteUpsert {
    fn from(update: NoteUpdate) -> Self {
        NoteUpsert {
            id: update.id,
            content: update.content,
            note_type: update.note_type,
            is_archived: update.is_archived,
            is_top: update.is_top,
            is_share: update.is_share,
            is_recycle: update.is_recycle,
        }
    }
}

/// Every item is applied on its own; an empty batch yields no outcomes and
/// repeated ids are sent as separate updates.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct BatchUpdateInput {
    #[validate(nested)]
    pub notes: Vec<NoteUpdate>,
}

/// Result of one item of a batch update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub id: i64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Applies note updates concurrently with independent outcomes.
pub struct BatchUpdateNotesTool {
    api: Arc<dyn NoteMutationApi>,
}

impl BatchUpdateNotesTool {
    pub fn new(api: Arc<dyn NoteMutationApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl NoteTool for BatchUpdateNotesTool {
    type Input = BatchUpdateInput;

    const NAME: &'static str = "batch-update-notes";

    fn description(&self) -> &str {
        "Update several notes at once: content, type (blinko, note or todo) and the \
         archived, pinned, shared and recycled flags. Omit a flag or pass null to keep it."
    }

    fn parameters_schema(&self) -> Value {
        let flag = json!({ "type": ["boolean", "null"] });
        json!({
            "type": "object",
            "properties": {
                "notes": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "integer" },
                            "content": { "type": "string" },
                            "type": { "type": "string", "enum": ["blinko", "note", "todo"], "default": "blinko" },
                            "isArchived": flag,
                            "isTop": flag,
                            "isShare": flag,
                            "isRecycle": flag
                        },
                        "required": ["id", "content"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["notes"],
            "additionalProperties": false
        })
    }

    async fn run(&self, input: BatchUpdateInput, caller: &CallerContext) -> Result<Value, ToolError> {
        let updates = input.notes.into_iter().map(|update| {
            let api = Arc::clone(&self.api);
            async move {
                let id = update.id;
                match api.upsert(caller, &NoteUpsert::from(update)).await {
                    Ok(note) => UpdateOutcome {
                        id,
                        ok: true,
                        note: Some(note),
                        error: None,
                    },
                    Err(e) => {
                        tracing::warn!(note_id = id, error = %e, "note update failed");
                        UpdateOutcome {
                            id,
                            ok: false,
                            note: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
        });

        let outcomes = join_all(updates).await;
        serde_json::to_value(outcomes).map_err(|e| ToolError::Execution(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tri_state_from_wire() {
        let update: NoteUpdate = serde_json::from_value(json!({
            "id": 1,
            "content": "x",
            "isArchived": true,
            "isTop": null,
            "isShare": false
        }))
        .unwrap();
        assert_eq!(update.is_archived, TriState::True);
        assert_eq!(update.is_top, TriState::Unset);
        assert_eq!(update.is_share, TriState::False);
        assert_eq!(update.is_recycle, TriState::Unset);
        assert_eq!(update.note_type, NoteType::Blinko);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let parsed: Result<NoteUpdate, _> =
            serde_json::from_value(json!({"id": 1, "content": "x", "type": "memo"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_batch_validation() {
        let empty: BatchUpdateInput = serde_json::from_value(json!({"notes": []})).unwrap();
        assert!(empty.validate().is_ok());

        let repeated: BatchUpdateInput = serde_json::from_value(json!({
            "notes": [{"id": 3, "content": "a"}, {"id": 3, "content": "b"}]
        }))
        .unwrap();
        assert!(repeated.validate().is_ok());

        let negative: BatchUpdateInput =
            serde_json::from_value(json!({"notes": [{"id": -1, "content": "a"}]})).unwrap();
        assert!(negative.validate().is_err());

        let fine: BatchUpdateInput = serde_json::from_value(json!({
            "notes": [{"id": 3, "content": "a", "type": "todo"}]
        }))
        .unwrap();
        assert!(fine.validate().is_ok());
    }

    #[test]
    fn test_update_serializes_in_wire_shape() {
        let update: NoteUpdate = serde_json::from_value(json!({
            "id": 9, "content": "x", "type": "todo", "isTop": true
        }))
        .unwrap();
        let wire = serde_json::to_value(&update).unwrap();
        assert_eq!(wire["type"], "todo");
        assert_eq!(wire["isTop"], true);
        assert_eq!(wire["isShare"], Value::Null);
    }
}
