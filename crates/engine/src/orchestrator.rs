//! Ordered execution of a step's submit actions.
//!
//! Actions run one after another. A gate that evaluates false skips its action
//! and the sequence continues. A failure aborts the remaining actions and leaves
//! the wizard on the step that ran. A worker suspends the sequence until its job
//! finishes, and a navigation action ends it early with an explicit target.

use reqwest::Method;
use serde_json::{Map, Value, json};
use toolkit_types::{
    ActionKind, ActionSpec, DispatchActionRequest, JobStatus, RunStateUpdate, StartRunRequest, StepDefinition, StepKind,
    ToolDefinition,
};
use tracing::{debug, info, warn};

use crate::backend::{ActionBackend, ApiRequest, path_segment};
use crate::condition::evaluate_gate;
use crate::error::StepError;
use crate::path::{DataBag, Lookup, format_json_value};
use crate::session::{Job, Session, StepMessage};
use crate::telemetry::ActionStatus;

/// Field appended to a `getSheetInfo` GET endpoint when `idField` is absent.
pub const DEFAULT_ID_FIELD: &str = "sheetId";

/// How a sequence ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceOutcome {
    /// Every action was skipped or succeeded. `navigate_to` is set when a
    /// navigation action chose the next step.
    Finished { navigate_to: Option<String> },
    /// A worker job was dispatched; the sequence resumes when it completes.
    Suspended(Job),
    /// An action failed; nothing after it ran.
    Aborted(StepError),
}

enum ActionEffect {
    Continue,
    Suspend(Job),
    NavigateTo(String),
}

/// Runs submit sequences against an [`ActionBackend`].
pub struct ActionOrchestrator<'a, B: ActionBackend + ?Sized> {
    backend: &'a B,
}

impl<'a, B: ActionBackend + ?Sized> ActionOrchestrator<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Executes `step.onSubmit` starting at `start_at`.
    pub async fn run(&self, tool: &ToolDefinition, step: &StepDefinition, session: &mut Session, start_at: usize) -> SequenceOutcome {
        for (index, action) in step.on_submit.iter().enumerate().skip(start_at) {
            let gate_open = {
                let bag = DataBag::new(&session.form_data, &session.response_data, Some(&step.id));
                evaluate_gate(action.condition.as_ref(), &bag)
            };
            if !gate_open {
                debug!(step_id = %step.id, index, action = action.action.as_str(), "action skipped by condition");
                session.telemetry.record(&step.id, index, action.action, ActionStatus::Skipped);
                continue;
            }

            debug!(step_id = %step.id, index, action = action.action.as_str(), "running action");
            let effect = match action.action {
                ActionKind::CallApi | ActionKind::GetSheetInfo => self.call_api(tool, step, action, session).await,
                ActionKind::StoreLocal => store_local(tool, step, action, session),
                ActionKind::Worker => self.dispatch_worker(tool, step, index, action, session).await,
                ActionKind::Navigation => self.navigate(tool, step, action, session).await,
            };

            match effect {
                Ok(ActionEffect::Continue) => {
                    session.telemetry.record(&step.id, index, action.action, ActionStatus::Succeeded);
                }
                Ok(ActionEffect::Suspend(job)) => {
                    session.telemetry.record(&step.id, index, action.action, ActionStatus::Suspended);
                    info!(step_id = %step.id, action_id = %job.action_id, run_id = %job.run_id, "worker dispatched");
                    return SequenceOutcome::Suspended(job);
                }
                Ok(ActionEffect::NavigateTo(target)) => {
                    session.telemetry.record(&step.id, index, action.action, ActionStatus::Succeeded);
                    return SequenceOutcome::Finished {
                        navigate_to: Some(target),
                    };
                }
                Err(error) => {
                    session.telemetry.record(&step.id, index, action.action, ActionStatus::Failed);
                    warn!(step_id = %step.id, index, action = action.action.as_str(), kind = ?error.kind, error = %error, "action sequence aborted");
                    return SequenceOutcome::Aborted(error);
                }
            }
        }
        SequenceOutcome::Finished { navigate_to: None }
    }

    async fn call_api(
        &self,
        tool: &ToolDefinition,
        step: &StepDefinition,
        action: &ActionSpec,
        session: &mut Session,
    ) -> Result<ActionEffect, StepError> {
        let request = build_request(step, action, session)?;
        debug!(
            step_id = %step.id,
            method = %request.method,
            endpoint = %request.endpoint,
            has_body = request.body.is_some(),
            "sending action request"
        );

        let response = self.backend.call(&request).await.map_err(StepError::from)?;

        if let Some(message) = response.get("message").and_then(Value::as_str) {
            session.message = Some(StepMessage::info(message));
        }
        if let Some(alias) = action.result_alias() {
            store_result(tool, step, alias, unwrap_envelope(response), session);
        }
        Ok(ActionEffect::Continue)
    }

    async fn dispatch_worker(
        &self,
        tool: &ToolDefinition,
        step: &StepDefinition,
        index: usize,
        action: &ActionSpec,
        session: &mut Session,
    ) -> Result<ActionEffect, StepError> {
        let action_id = action
            .action_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StepError::configuration(format!("Worker action on step '{}' has no actionId configured.", step.id)))?
            .to_string();

        let run_id = self.ensure_run(tool, session).await?;

        let mut form_data: Map<String, Value> = session
            .form_data
            .iter()
            .map(|(step_id, record)| (step_id.clone(), Value::Object(record.clone())))
            .collect();
        form_data.insert("currentStepId".to_string(), Value::String(step.id.clone()));
        let request = DispatchActionRequest {
            action_id: action_id.clone(),
            form_data,
            run_data: session.response_data.clone(),
        };
        self.backend
            .dispatch_action(&run_id, &request)
            .await
            .map_err(StepError::from)?;

        Ok(ActionEffect::Suspend(Job {
            action_id,
            run_id,
            status: JobStatus::Pending,
            error: None,
            step_id: step.id.clone(),
            resume_from: index + 1,
            error_step: action.on_error.as_ref().map(|route| route.go_to_step.clone()),
        }))
    }

    async fn navigate(
        &self,
        tool: &ToolDefinition,
        step: &StepDefinition,
        action: &ActionSpec,
        session: &mut Session,
    ) -> Result<ActionEffect, StepError> {
        let target = action
            .go_to_step
            .as_deref()
            .filter(|target| !target.trim().is_empty())
            .ok_or_else(|| StepError::configuration(format!("Navigation action on step '{}' has no goToStep configured.", step.id)))?;
        if tool.step(target).is_none() {
            return Err(StepError::configuration(format!("Navigation target '{target}' does not exist.")));
        }

        let run_id = self.ensure_run(tool, session).await?;
        let update = RunStateUpdate {
            current_step_id: target.to_string(),
            form_data: session.form_data.clone(),
        };
        self.backend
            .save_run_state(&run_id, &update)
            .await
            .map_err(StepError::from)?;
        Ok(ActionEffect::NavigateTo(target.to_string()))
    }

    /// Returns the session's run, starting one on first use.
    async fn ensure_run(&self, tool: &ToolDefinition, session: &mut Session) -> Result<String, StepError> {
        if let Some(run_id) = &session.run_id {
            return Ok(run_id.clone());
        }
        let request = StartRunRequest {
            tool_id: &tool.id,
            tool_definition: tool,
            form_data: &session.form_data,
        };
        let response = self.backend.start_run(&request).await.map_err(StepError::from)?;
        info!(tool_id = %tool.id, run_id = %response.run_id, "started backend run");
        session.run_id = Some(response.run_id.clone());
        Ok(response.run_id)
    }
}

fn store_local(tool: &ToolDefinition, step: &StepDefinition, action: &ActionSpec, session: &mut Session) -> Result<ActionEffect, StepError> {
    let alias = action
        .result_alias()
        .ok_or_else(|| StepError::configuration(format!("storeLocal action on step '{}' has no storeDataAs alias.", step.id)))?;

    let payload = if !action.input_mapping.is_empty() {
        let bag = DataBag::new(&session.form_data, &session.response_data, Some(&step.id));
        Value::Object(build_input(action, &bag))
    } else if let Some(literal) = &action.data_to_store {
        literal.clone()
    } else {
        Value::Object(session.form_data.get(&step.id).cloned().unwrap_or_default())
    };

    store_result(tool, step, alias, payload, session);
    Ok(ActionEffect::Continue)
}

/// Builds the request for a `callApi` or `getSheetInfo` action.
fn build_request(step: &StepDefinition, action: &ActionSpec, session: &Session) -> Result<ApiRequest, StepError> {
    let endpoint = action
        .api_endpoint
        .as_deref()
        .map(str::trim)
        .filter(|endpoint| !endpoint.is_empty())
        .ok_or_else(|| {
            StepError::configuration(format!(
                "Action '{}' on step '{}' has no apiEndpoint configured.",
                action.action.as_str(),
                step.id
            ))
        })?;
    let method = parse_method(action.method.as_deref())?;

    let bag = DataBag::new(&session.form_data, &session.response_data, Some(&step.id));
    let input = build_input(action, &bag);

    if action.action == ActionKind::GetSheetInfo && method == Method::GET {
        let id_field = action.id_field.as_deref().unwrap_or(DEFAULT_ID_FIELD);
        let identifier = input
            .get(id_field)
            .cloned()
            .or_else(|| bag.lookup_str(id_field))
            .map(|value| format_json_value(&value))
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| StepError::validation(format!("A value for '{id_field}' is required to call {endpoint}.")))?;
        return Ok(ApiRequest {
            method,
            endpoint: format!("{}/{}", endpoint.trim_end_matches('/'), path_segment(identifier.trim())),
            body: None,
        });
    }

    let carries_body = method == Method::POST || method == Method::PUT || method == Method::PATCH;
    let body = carries_body.then(|| {
        if step.kind == StepKind::Prompt || action.prompt {
            json!({
                "promptContext": action.prompt_context.clone().map(Value::String).unwrap_or(Value::Null),
                "data": Value::Object(input),
            })
        } else {
            Value::Object(input)
        }
    });

    Ok(ApiRequest {
        method,
        endpoint: endpoint.to_string(),
        body,
    })
}

/// Resolves every `inputMapping` entry; paths that resolve to nothing are omitted.
fn build_input(action: &ActionSpec, bag: &DataBag<'_>) -> Map<String, Value> {
    let mut input = Map::new();
    for (key, raw_path) in &action.input_mapping {
        match bag.lookup_str(raw_path) {
            Some(value) => {
                input.insert(key.clone(), value);
            }
            None => debug!(key = %key, path = %raw_path, "input mapping resolved to nothing"),
        }
    }
    input
}

fn parse_method(raw: Option<&str>) -> Result<Method, StepError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(Method::POST);
    };
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| StepError::configuration(format!("Unsupported HTTP method '{raw}'.")))
}

/// Unwraps a `{data: ...}` response envelope.
fn unwrap_envelope(response: Value) -> Value {
    match response {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}

/// Stores `value` under `alias` and pre-seeds the successor grid when it reads that alias.
fn store_result(tool: &ToolDefinition, step: &StepDefinition, alias: &str, value: Value, session: &mut Session) {
    session.response_data.insert(alias.to_string(), value);
    info!(step_id = %step.id, alias, "stored action result");

    if let Ok(Some(next)) = tool.successor_of(&step.id)
        && next.kind == StepKind::Grid
        && next.data_source.as_deref() == Some(alias)
        && let Some(source) = session.response_data.get(alias)
    {
        let rows = session.grids.seed(&next.id, source).rows_value();
        session.set_field(&next.id, "rows", rows);
    }
    session.prefill_from_sources(step);
}
