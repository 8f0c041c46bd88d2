use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::{Validate, ValidationError};

use super::note_api::NoteMutationApi;
use super::{CallerContext, NoteTool, ToolError};

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DeleteNotesInput {
    #[validate(
        length(min = 1, message = "at least one note id is required"),
        custom(function = "validate_note_ids")
    )]
    pub ids: Vec<i64>,
}

fn validate_note_ids(ids: &[i64]) -> Result<(), ValidationError> {
    if ids.iter().any(|&id| id <= 0) {
        return Err(ValidationError::new("note ids must be positive"));
    }
    Ok(())
}

/// Moves notes to the trash in one batch call.
pub struct DeleteNotesTool {
    api: Arc<dyn NoteMutationApi>,
}

impl DeleteNotesTool {
    pub fn new(api: Arc<dyn NoteMutationApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl NoteTool for DeleteNotesTool {
    type Input = DeleteNotesInput;

    const NAME: &'static str = "delete-notes";

    fn description(&self) -> &str {
        "Move notes to the trash by id. Use after the user confirms which notes to delete."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ids": {
                    "type": "array",
                    "items": { "type": "integer" },
                    "minItems": 1,
                    "description": "Ids of the notes to delete"
                }
            },
            "required": ["ids"],
            "additionalProperties": false
        })
    }

    async fn run(&self, input: DeleteNotesInput, caller: &CallerContext) -> Result<Value, ToolError> {
        self.api
            .trash_many(caller, &input.ids)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;
        tracing::info!(account = %caller.account_id, count = input.ids.len(), "notes moved to trash");
        Ok(Value::Bool(true))
    }
}
