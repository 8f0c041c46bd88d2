//! Agent-invocable note mutation tools.
//!
//! Each tool declares a name, a description for the agent's planner, and a
//! JSON schema for its input. Execution always follows the same order:
//!
//! 1. Deserialize and validate the input (`serde` + `validator`). Invalid
//!    input fails with [`ToolError::Validation`] before anything else runs.
//! 2. Build a fresh [`CallerContext`] from the account id in the agent's
//!    [`RuntimeContext`], with the role set by the [`ImpersonationPolicy`].
//! 3. Call the note mutation API as that caller.
//!
//! # Trust boundary
//!
//! The executor trusts whatever account id the agent runtime supplies.
//! Binding that id to the authenticated end user is the runtime's job and
//! must happen before the agent loop starts. The impersonated role is a
//! configured policy (`[tools] impersonation_role`) and defaults to
//! `superadmin`.
//!
//! Inside the crate every call returns `Result<Value, ToolError>`;
//! [`ToolRegistry::dispatch`] is the only place an error is flattened into
//! the display string the agent sees.

mod batch_update;
mod delete_notes;
pub mod note_api;

pub use batch_update::{BatchUpdateInput, BatchUpdateNotesTool, NoteType, NoteUpdate, TriState, UpdateOutcome};
pub use delete_notes::{DeleteNotesInput, DeleteNotesTool};
pub use note_api::{HttpNoteApi, NoteApiError, NoteMutationApi, NoteUpsert};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Superadmin => "superadmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity a single tool invocation runs as. Never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub account_id: String,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
}

/// What the agent runtime hands the executor for each call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeContext {
    #[serde(default)]
    pub account_id: Option<String>,
}

impl RuntimeContext {
    pub fn for_account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
        }
    }
}

/// Builds the impersonated caller for each invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpersonationPolicy {
    pub role: Role,
}

impl Default for ImpersonationPolicy {
    fn default() -> Self {
        Self {
            role: Role::Superadmin,
        }
    }
}

impl ImpersonationPolicy {
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    /// Fails unless the runtime's account id is non-empty and numeric.
    pub fn caller_for(&self, runtime: &RuntimeContext) -> Result<CallerContext, ToolError> {
        let raw = runtime.account_id.as_deref().map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(ToolError::InvalidAccount("missing account id".to_string()));
        }
        let id: i64 = raw
            .parse()
            .map_err(|_| ToolError::InvalidAccount(format!("account id '{}' is not numeric", raw)))?;

        Ok(CallerContext {
            account_id: id.to_string(),
            role: self.role,
            issued_at: Utc::now(),
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("invalid account: {0}")]
    InvalidAccount(String),
    /// Downstream failure; displays as the downstream message.
    #[error("{0}")]
    Execution(String),
}

/// Object-safe tool interface stored in the registry.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Natural-language description for the agent's planner.
    fn description(&self) -> &str;

    /// JSON schema of the accepted input.
    fn parameters_schema(&self) -> Value;

    async fn execute(
        &self,
        params: Value,
        runtime: &RuntimeContext,
        policy: &ImpersonationPolicy,
    ) -> Result<Value, ToolError>;
}

/// A tool with a typed, validated input.
///
/// Every `NoteTool` is a [`Tool`]; the blanket implementation performs
/// validation and caller construction so `run` only sees checked input.
#[async_trait]
pub trait NoteTool: Send + Sync {
    type Input: DeserializeOwned + Validate + Send;

    const NAME: &'static str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    async fn run(&self, input: Self::Input, caller: &CallerContext) -> Result<Value, ToolError>;
}

fn parse_input<I: DeserializeOwned + Validate>(params: Value) -> Result<I, ToolError> {
    let input: I = serde_json::from_value(params).map_err(|e| ToolError::Validation(e.to_string()))?;
    input.validate().map_err(|e| ToolError::Validation(e.to_string()))?;
    Ok(input)
}

#[async_trait]
impl<T: NoteTool> Tool for T {
    fn name(&self) -> &str {
        T::NAME
    }

    fn description(&self) -> &str {
        NoteTool::description(self)
    }

    fn parameters_schema(&self) -> Value {
        NoteTool::parameters_schema(self)
    }

    async fn execute(
        &self,
        params: Value,
        runtime: &RuntimeContext,
        policy: &ImpersonationPolicy,
    ) -> Result<Value, ToolError> {
        let input = parse_input::<T::Input>(params)?;
        let caller = policy.caller_for(runtime)?;
        self.run(input, &caller).await
    }
}

/// Agent-facing envelope: a value on success, a display string on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<Value, ToolError>> for ToolResult {
    fn from(outcome: Result<Value, ToolError>) -> Self {
        match outcome {
            Ok(value) => Self {
                ok: true,
                result: Some(value),
                error: None,
            },
            Err(e) => Self {
                ok: false,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Tool listing entry for agent discovery.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Fixed set of tools plus the impersonation policy they run under.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    policy: ImpersonationPolicy,
}

impl ToolRegistry {
    pub fn new(policy: ImpersonationPolicy) -> Self {
        Self {
            tools: BTreeMap::new(),
            policy,
        }
    }

    /// Registry holding `delete-notes` and `batch-update-notes`.
    pub fn with_note_tools(api: Arc<dyn NoteMutationApi>, policy: ImpersonationPolicy) -> Self {
        let mut registry = Self::new(policy);
        registry.register(Arc::new(DeleteNotesTool::new(api.clone())));
        registry.register(Arc::new(BatchUpdateNotesTool::new(api)));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn policy(&self) -> &ImpersonationPolicy {
        &self.policy
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool by name.
    pub async fn call(&self, name: &str, params: Value, runtime: &RuntimeContext) -> Result<Value, ToolError> {
        let tool = self
            .find(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tracing::info!(tool = name, account = ?runtime.account_id, "tool invoked");
        let outcome = tool.execute(params, runtime, &self.policy).await;
        if let Err(e) = &outcome {
            tracing::warn!(tool = name, error = %e, "tool call failed");
        }
        outcome
    }

    /// Invoke a tool and render the outcome for the agent loop.
    pub async fn dispatch(&self, name: &str, params: Value, runtime: &RuntimeContext) -> ToolResult {
        self.call(name, params, runtime).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_caller_is_built_from_numeric_account() {
        let policy = ImpersonationPolicy::default();
        let caller = policy.caller_for(&RuntimeContext::for_account(" 42 ")).unwrap();
        assert_eq!(caller.account_id, "42");
        assert_eq!(caller.role, Role::Superadmin);

        let user = ImpersonationPolicy::new(Role::User)
            .caller_for(&RuntimeContext::for_account("7"))
            .unwrap();
        assert_eq!(user.role, Role::User);
    }

    #[test]
    fn test_invalid_accounts_are_rejected() {
        let policy = ImpersonationPolicy::default();
        for runtime in [
            RuntimeContext::default(),
            RuntimeContext::for_account(""),
            RuntimeContext::for_account("   "),
            RuntimeContext::for_account("abc"),
            RuntimeContext::for_account("4.2"),
        ] {
            assert!(matches!(
                policy.caller_for(&runtime),
                Err(ToolError::InvalidAccount(_))
            ));
        }
    }

    #[test]
    fn test_tool_result_envelope() {
        let ok: ToolResult = Ok(json!(true)).into();
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"ok": true, "result": true}));

        let failed: ToolResult = Err(ToolError::Execution("note service unavailable".into())).into();
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"ok": false, "error": "note service unavailable"})
        );
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_value(Role::Superadmin).unwrap(), json!("superadmin"));
        let role: Role = serde_json::from_value(json!("admin")).unwrap();
        assert_eq!(role, Role::Admin);
    }
}
