//! Tool executor: validation, impersonation, and downstream failure handling.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use blinko_ai::config::HttpConfig;
use blinko_ai::http::SharedFetch;
use blinko_ai::tools::{
    CallerContext, HttpNoteApi, ImpersonationPolicy, NoteApiError, NoteMutationApi, NoteType, NoteUpsert, Role,
    RuntimeContext, ToolError, ToolRegistry, TriState, UpdateOutcome,
};

#[derive(Debug, Clone)]
enum Call {
    Trash { caller: CallerContext, ids: Vec<i64> },
    Upsert { caller: CallerContext, note: NoteUpsert },
}

/// Records every call; fails trash or upserts of listed ids on request.
#[derive(Default)]
struct RecordingNoteApi {
    calls: Mutex<Vec<Call>>,
    fail_trash: Option<String>,
    fail_upsert_ids: Vec<i64>,
}

impl RecordingNoteApi {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NoteMutationApi for RecordingNoteApi {
    async fn trash_many(&self, caller: &CallerContext, ids: &[i64]) -> Result<(), NoteApiError> {
        self.calls.lock().unwrap().push(Call::Trash {
            caller: caller.clone(),
            ids: ids.to_vec(),
        });
        match &self.fail_trash {
            Some(message) => Err(NoteApiError::Transport(message.clone())),
            None => Ok(()),
        }
    }

    async fn upsert(&self, caller: &CallerContext, note: &NoteUpsert) -> Result<Value, NoteApiError> {
        self.calls.lock().unwrap().push(Call::Upsert {
            caller: caller.clone(),
            note: note.clone(),
        });
        if self.fail_upsert_ids.contains(&note.id) {
            return Err(NoteApiError::Status {
                status: 404,
                message: format!("note {} not found", note.id),
            });
        }
        Ok(json!({ "id": note.id, "content": note.content }))
    }
}

fn registry(api: Arc<RecordingNoteApi>) -> ToolRegistry {
    ToolRegistry::with_note_tools(api, ImpersonationPolicy::default())
}

#[tokio::test]
async fn test_delete_notes_impersonates_account() {
    let api = Arc::new(RecordingNoteApi::default());
    let tools = registry(api.clone());

    let result = tools
        .dispatch(
            "delete-notes",
            json!({ "ids": [1, 2, 3] }),
            &RuntimeContext::for_account("42"),
        )
        .await;
    assert!(result.ok);
    assert_eq!(result.result, Some(json!(true)));

    let calls = api.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Call::Trash { caller, ids } => {
            assert_eq!(caller.account_id, "42");
            assert_eq!(caller.role, Role::Superadmin);
            assert_eq!(ids, &vec![1, 2, 3]);
        }
        other => panic!("unexpected call: {other:?}"),
    }
}

#[tokio::test]
async fn test_delete_notes_downstream_failure_is_a_string() {
    let api = Arc::new(RecordingNoteApi {
        fail_trash: Some("connection reset".to_string()),
        ..Default::default()
    });
    let tools = registry(api);

    let result = tools
        .dispatch("delete-notes", json!({ "ids": [7] }), &RuntimeContext::for_account("42"))
        .await;
    assert!(!result.ok);
    assert_eq!(
        result.error.as_deref(),
        Some("note service request failed: connection reset")
    );

    let typed = tools
        .call("delete-notes", json!({ "ids": [7] }), &RuntimeContext::for_account("42"))
        .await;
    assert!(matches!(typed, Err(ToolError::Execution(_))));
}

#[tokio::test]
async fn test_invalid_input_never_reaches_the_api() {
    let api = Arc::new(RecordingNoteApi::default());
    let tools = registry(api.clone());
    let runtime = RuntimeContext::for_account("42");

    for params in [
        json!({ "ids": [] }),
        json!({ "ids": ["1"] }),
        json!({ "ids": [1.5] }),
        json!({ "ids": [0] }),
        json!({ "ids": [1], "force": true }),
        json!({}),
    ] {
        let err = tools.call("delete-notes", params.clone(), &runtime).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)), "{params} gave {err:?}");
    }

    let err = tools
        .call(
            "batch-update-notes",
            json!({ "notes": [{ "id": 1, "content": "x", "type": "memo" }] }),
            &runtime,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Validation(_)));

    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_account_never_reaches_the_api() {
    let api = Arc::new(RecordingNoteApi::default());
    let tools = registry(api.clone());

    for runtime in [
        RuntimeContext::default(),
        RuntimeContext::for_account(""),
        RuntimeContext::for_account("admin"),
    ] {
        let result = tools
            .dispatch("delete-notes", json!({ "ids": [1] }), &runtime)
            .await;
        assert!(!result.ok);
        assert!(result.error.unwrap().starts_with("invalid account"));
    }
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_validation_runs_before_account_check() {
    let tools = registry(Arc::new(RecordingNoteApi::default()));
    let err = tools
        .call("delete-notes", json!({ "ids": [] }), &RuntimeContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Validation(_)));
}

#[tokio::test]
async fn test_batch_update_outcomes_are_independent() {
    let api = Arc::new(RecordingNoteApi {
        fail_upsert_ids: vec![2],
        ..Default::default()
    });
    let tools = registry(api.clone());

    let value = tools
        .call(
            "batch-update-notes",
            json!({
                "notes": [
                    { "id": 1, "content": "first", "isTop": true },
                    { "id": 2, "content": "second", "type": "todo" },
                    { "id": 3, "content": "third", "isArchived": false, "isShare": null }
                ]
            }),
            &RuntimeContext::for_account("42"),
        )
        .await
        .unwrap();

    let outcomes: Vec<UpdateOutcome> = serde_json::from_value(value).unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(outcomes[0].ok && outcomes[2].ok);
    assert!(!outcomes[1].ok);
    assert_eq!(outcomes[1].error.as_deref(), Some("note service returned HTTP 404: note 2 not found"));

    let calls = api.calls();
    assert_eq!(calls.len(), 3);
    for call in &calls {
        let Call::Upsert { caller, note } = call else {
            panic!("unexpected call: {call:?}");
        };
        assert_eq!(caller.account_id, "42");
        match note.id {
            1 => {
                assert_eq!(note.is_top, TriState::True);
                assert_eq!(note.note_type, NoteType::Blinko);
            }
            2 => assert_eq!(note.note_type, NoteType::Todo),
            3 => {
                assert_eq!(note.is_archived, TriState::False);
                assert_eq!(note.is_share, TriState::Unset);
            }
            other => panic!("unexpected note {other}"),
        }
    }
}

#[tokio::test]
async fn test_impersonation_role_is_configurable() {
    let api = Arc::new(RecordingNoteApi::default());
    let tools = ToolRegistry::with_note_tools(api.clone(), ImpersonationPolicy::new(Role::User));

    tools
        .call("delete-notes", json!({ "ids": [5] }), &RuntimeContext::for_account("9"))
        .await
        .unwrap();
    let Call::Trash { caller, .. } = &api.calls()[0] else {
        panic!("expected a trash call");
    };
    assert_eq!(caller.role, Role::User);
}

#[tokio::test]
async fn test_unknown_tool() {
    let tools = registry(Arc::new(RecordingNoteApi::default()));
    let result = tools
        .dispatch("drop-database", json!({}), &RuntimeContext::for_account("1"))
        .await;
    assert_eq!(result.error.as_deref(), Some("unknown tool: drop-database"));
}

#[tokio::test]
async fn test_registry_lists_both_tools() {
    let tools = registry(Arc::new(RecordingNoteApi::default()));
    assert_eq!(tools.len(), 2);
    let names: Vec<String> = tools.definitions().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["batch-update-notes", "delete-notes"]);
    let delete = tools.find("delete-notes").unwrap();
    assert_eq!(delete.parameters_schema()["required"], json!(["ids"]));
}

#[tokio::test]
async fn test_http_note_api_sends_impersonation_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/note/batch-trash"))
        .and(header("authorization", "Bearer service-token"))
        .and(header("x-impersonate-account", "42"))
        .and(header("x-impersonate-role", "superadmin"))
        .and(body_json(json!({ "ids": [1, 2, 3] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/note/upsert"))
        .and(body_json(json!({ "id": 4, "content": "hi", "type": 1, "isRecycle": true })))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "database locked" })))
        .mount(&server)
        .await;

    let api = Arc::new(HttpNoteApi::new(
        &format!("{}/", server.uri()),
        "service-token",
        Arc::new(SharedFetch::new(HttpConfig::default())),
    ));
    let tools = ToolRegistry::with_note_tools(api, ImpersonationPolicy::default());
    let runtime = RuntimeContext::for_account("42");

    let deleted = tools
        .dispatch("delete-notes", json!({ "ids": [1, 2, 3] }), &runtime)
        .await;
    assert!(deleted.ok, "{deleted:?}");

    let updated = tools
        .call(
            "batch-update-notes",
            json!({ "notes": [{ "id": 4, "content": "hi", "type": "note", "isRecycle": true }] }),
            &runtime,
        )
        .await
        .unwrap();
    assert_eq!(
        updated,
        json!([{ "id": 4, "ok": false, "error": "note service returned HTTP 500: database locked" }])
    );
}

#[tokio::test]
async fn test_batch_update_applies_each_item_as_given() {
    let api = Arc::new(RecordingNoteApi::default());
    let tools = registry(api.clone());
    let runtime = RuntimeContext::for_account("42");

    let empty = tools
        .call("batch-update-notes", json!({ "notes": [] }), &runtime)
        .await
        .unwrap();
    assert_eq!(empty, json!([]));

    let value = tools
        .call(
            "batch-update-notes",
            json!({ "notes": [{ "id": 8, "content": "draft" }, { "id": 8, "content": "final" }] }),
            &runtime,
        )
        .await
        .unwrap();
    let outcomes: Vec<UpdateOutcome> = serde_json::from_value(value).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.ok && o.id == 8));
    assert_eq!(api.calls().len(), 2);
}
