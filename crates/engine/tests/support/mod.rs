//! Scripted in-memory backend shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use toolkit_api::ApiError;
use toolkit_engine::{ActionBackend, ApiRequest, EngineConfig, Wizard};
use toolkit_types::{DispatchActionRequest, RunRecord, RunStateUpdate, StartRunRequest, StartRunResponse, ToolDefinition};

pub const SHEET_ID: &str = "abc123";

pub fn sheet_builder() -> ToolDefinition {
    serde_json::from_str(include_str!("../data/sheet_builder.json")).expect("parse sheet builder fixture")
}

/// One call observed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    FetchTool(String),
    Call(ApiRequest),
    StartRun { tool_id: String },
    Dispatch { run_id: String, action_id: String, form_data: serde_json::Map<String, Value> },
    SaveState { run_id: String, step_id: String },
    FetchRun(String),
}

#[derive(Default)]
struct Script {
    tool: Option<ToolDefinition>,
    replies: HashMap<String, Result<Value, ApiError>>,
    run_records: VecDeque<Result<RunRecord, ApiError>>,
    calls: Vec<Recorded>,
    next_run: u32,
    save_error: Option<ApiError>,
}

/// Backend that answers from a script and records every call.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    pub fn with_tool(tool: ToolDefinition) -> Self {
        let backend = Self::default();
        backend.lock().tool = Some(tool);
        backend
    }

    /// Answers `METHOD endpoint` with `reply` every time it is called.
    pub fn reply(&self, method: &str, endpoint: &str, reply: Result<Value, ApiError>) -> &Self {
        self.lock().replies.insert(format!("{method} {endpoint}"), reply);
        self
    }

    /// Queues the result of the next `fetch_run`.
    pub fn push_run(&self, record: Result<RunRecord, ApiError>) -> &Self {
        self.lock().run_records.push_back(record);
        self
    }

    /// Makes every `save_run_state` fail with `error`.
    pub fn fail_save_state(&self, error: ApiError) -> &Self {
        self.lock().save_error = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.lock().calls.clone()
    }

    /// Endpoints of the action requests made so far.
    pub fn called_endpoints(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Recorded::Call(request) => Some(format!("{} {}", request.method, request.endpoint)),
                _ => None,
            })
            .collect()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Recorded::Call(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn fetch_run_count(&self) -> usize {
        self.calls().iter().filter(|call| matches!(call, Recorded::FetchRun(_))).count()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("script lock")
    }
}

#[async_trait]
impl ActionBackend for ScriptedBackend {
    async fn fetch_tool(&self, tool_id: &str) -> Result<ToolDefinition, ApiError> {
        let mut script = self.lock();
        script.calls.push(Recorded::FetchTool(tool_id.to_string()));
        match &script.tool {
            Some(tool) if tool.id == tool_id => Ok(tool.clone()),
            _ => Err(ApiError::Status {
                status: 404,
                message: Some(format!("tool '{tool_id}' not found")),
            }),
        }
    }

    async fn call(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let mut script = self.lock();
        script.calls.push(Recorded::Call(request.clone()));
        let key = format!("{} {}", request.method, request.endpoint);
        script.replies.get(&key).cloned().unwrap_or_else(|| {
            Err(ApiError::Status {
                status: 404,
                message: Some(format!("no scripted reply for {key}")),
            })
        })
    }

    async fn start_run(&self, request: &StartRunRequest<'_>) -> Result<StartRunResponse, ApiError> {
        let mut script = self.lock();
        script.calls.push(Recorded::StartRun {
            tool_id: request.tool_id.to_string(),
        });
        script.next_run += 1;
        Ok(StartRunResponse {
            run_id: format!("run-{}", script.next_run),
        })
    }

    async fn dispatch_action(&self, run_id: &str, request: &DispatchActionRequest) -> Result<(), ApiError> {
        self.lock().calls.push(Recorded::Dispatch {
            run_id: run_id.to_string(),
            action_id: request.action_id.clone(),
            form_data: request.form_data.clone(),
        });
        Ok(())
    }

    async fn save_run_state(&self, run_id: &str, update: &RunStateUpdate) -> Result<(), ApiError> {
        let mut script = self.lock();
        script.calls.push(Recorded::SaveState {
            run_id: run_id.to_string(),
            step_id: update.current_step_id.clone(),
        });
        match &script.save_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn fetch_run(&self, run_id: &str) -> Result<RunRecord, ApiError> {
        let mut script = self.lock();
        script.calls.push(Recorded::FetchRun(run_id.to_string()));
        script.run_records.pop_front().unwrap_or_else(|| Ok(RunRecord::default()))
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        poll_interval_ms: 5,
        ..EngineConfig::default()
    }
}

/// Backend scripted for the happy path of the sheet builder up to the grid step.
pub fn happy_backend() -> ScriptedBackend {
    backend_for(sheet_builder())
}

/// Same replies as [`happy_backend`], serving `tool` instead of the fixture as is.
pub fn backend_for(tool: ToolDefinition) -> ScriptedBackend {
    let backend = ScriptedBackend::with_tool(tool);
    backend
        .reply(
            "GET",
            &format!("/sheet/{SHEET_ID}"),
            Ok(serde_json::json!({
                "message": "Sheet found",
                "data": { "title": "Budget 2026", "sheetId": SHEET_ID }
            })),
        )
        .reply(
            "POST",
            "/columns",
            Ok(serde_json::json!({
                "schema": [
                    { "key": "name", "label": "Name", "type": "text" },
                    { "key": "kind", "label": "Kind", "type": "select", "options": ["string", "number"] },
                    { "key": "required", "label": "Required", "type": "checkbox" }
                ],
                "rows": [
                    { "id": "c-1", "name": "Item", "kind": "string", "required": true },
                    { "id": "c-2", "name": "Amount", "kind": "number", "required": false }
                ]
            })),
        )
        .reply("POST", "/audit", Ok(serde_json::json!({})));
    backend
}

pub async fn loaded_wizard(backend: &ScriptedBackend) -> Wizard<ScriptedBackend> {
    let mut wizard = Wizard::new(backend.clone(), test_config());
    wizard.load_tool("sheet-builder").await;
    wizard
}

/// Answers the first two steps and advances onto the grid step.
pub async fn wizard_at_grid(backend: &ScriptedBackend) -> Wizard<ScriptedBackend> {
    let mut wizard = loaded_wizard(backend).await;
    wizard.update_field("sheetId", Value::String(SHEET_ID.into()));
    wizard.advance_step("getSheetId").await;
    wizard.update_field("category", Value::String("finance".into()));
    wizard.update_field("template", Value::String("budget".into()));
    wizard.advance_step("chooseTemplate").await;
    wizard
}
