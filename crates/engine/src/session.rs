//! Mutable state of one wizard session.
//!
//! Everything the view reads lives here, and every piece is created empty when
//! a tool loads and discarded together on reset.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use toolkit_types::{JobStatus, StepDefinition};

use crate::error::StepError;
use crate::grid::GridStore;
use crate::path::{Path, navigate};
use crate::telemetry::ActionTelemetry;
use crate::visibility::is_empty_value;

/// Answers keyed by step id, then field id.
pub type FormData = IndexMap<String, Map<String, Value>>;
/// Stored action results keyed by alias. Last write wins.
pub type ResponseData = IndexMap<String, Value>;
/// Field-scoped validation messages for the active step.
pub type ValidationErrors = IndexMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Informational banner attached to the active step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepMessage {
    pub level: MessageLevel,
    pub message: String,
}

impl StepMessage {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Info,
            message: message.into(),
        }
    }
}

/// The single in-flight worker job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub action_id: String,
    pub run_id: String,
    pub status: JobStatus,
    pub error: Option<String>,
    /// Step whose sequence dispatched the job.
    pub step_id: String,
    /// Index of the action to resume with once the job completes.
    pub resume_from: usize,
    /// Declared failure route, if any.
    pub error_step: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub form_data: FormData,
    pub response_data: ResponseData,
    pub history: Vec<String>,
    pub validation_errors: ValidationErrors,
    pub error: Option<StepError>,
    pub message: Option<StepMessage>,
    /// Set while an action sequence or worker job is running; advancing is refused meanwhile.
    pub loading: bool,
    pub job: Option<Job>,
    /// Backend run created lazily by the first worker or navigation action.
    pub run_id: Option<String>,
    pub grids: GridStore,
    pub telemetry: ActionTelemetry,
}

impl Session {
    /// Clears every piece of state. Dropping the job cancels any polling.
    pub fn reset(&mut self) {
        *self = Session::default();
    }

    pub fn current_step(&self) -> Option<&str> {
        self.history.last().map(String::as_str)
    }

    pub fn field_value(&self, step_id: &str, field_id: &str) -> Option<&Value> {
        self.form_data.get(step_id).and_then(|record| record.get(field_id))
    }

    pub fn set_field(&mut self, step_id: &str, field_id: &str, value: Value) {
        self.form_data
            .entry(step_id.to_string())
            .or_default()
            .insert(field_id.to_string(), value);
    }

    /// Clears the step-scoped error, message and validation state.
    pub fn clear_step_feedback(&mut self) {
        self.error = None;
        self.message = None;
        self.validation_errors.clear();
    }

    /// Fills still-empty fields of `step` that declare a `sourceDataKey` from stored results.
    pub fn prefill_from_sources(&mut self, step: &StepDefinition) {
        for field in &step.fields {
            let Some(alias) = field.source_data_key.as_deref() else {
                continue;
            };
            if !is_empty_value(self.field_value(&step.id, &field.id)) {
                continue;
            }
            let Some(source) = self.response_data.get(alias) else {
                continue;
            };
            let keys = match field.source_data_path.as_deref() {
                Some(raw) => match raw.parse::<Path>() {
                    Ok(path) => std::iter::once(path.scope).chain(path.keys).collect(),
                    Err(_) => continue,
                },
                None => Vec::new(),
            };
            if let Some(value) = navigate(source, &keys).cloned() {
                self.set_field(&step.id, &field.id, value);
            }
        }
    }

    pub fn has_pending_job(&self) -> bool {
        self.job.as_ref().is_some_and(|job| !job.status.is_terminal())
    }
}
