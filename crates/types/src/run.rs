//! Wire payloads for the backend run lifecycle.
//!
//! Worker and navigation actions operate on a server-side run. The run record
//! carries a job history keyed by action id, which the engine polls until the
//! job reaches a terminal status.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::tool::ToolDefinition;

/// Status reported for one worker job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    /// Any non-terminal status the server reports (queued, running, ...).
    #[serde(other)]
    InProgress,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One entry of `jobHistory`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobHistoryEntry {
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// Run record returned by `GET /runs/{runId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub current_step_id: Option<String>,
    /// Server copy of the session form data, keyed by step id.
    #[serde(default)]
    pub form_data: IndexMap<String, Map<String, JsonValue>>,
    /// Server copy of the response data, keyed by alias.
    #[serde(default)]
    pub run_data: IndexMap<String, JsonValue>,
    #[serde(default)]
    pub job_history: IndexMap<String, JobHistoryEntry>,
}

impl RunRecord {
    /// Collapses the run record into the status of the job dispatched for `action_id`.
    ///
    /// A job that has not appeared in the history yet is still pending.
    pub fn job_report(&self, action_id: &str) -> JobStatusReport {
        let entry = self.job_history.get(action_id).cloned().unwrap_or_default();
        let result = (entry.status == JobStatus::Completed).then(|| JobResult {
            form_data: self.form_data.clone(),
            response_data: self.run_data.clone(),
            next_step_id: self.current_step_id.clone(),
        });
        JobStatusReport { status: entry.status, result, error: entry.error }
    }
}

/// Normalized `{status, result?, error?}` observed by the poller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct JobStatusReport {
    pub status: JobStatus,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub error: Option<String>,
}

/// State the server hands back when a job completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    #[serde(default)]
    pub form_data: IndexMap<String, Map<String, JsonValue>>,
    #[serde(default)]
    pub response_data: IndexMap<String, JsonValue>,
    #[serde(default)]
    pub next_step_id: Option<String>,
}

/// Body of `POST /runs`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest<'a> {
    pub tool_id: &'a str,
    pub tool_definition: &'a ToolDefinition,
    pub form_data: &'a IndexMap<String, Map<String, JsonValue>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    pub run_id: String,
}

/// Body of `POST /runs/{runId}/actions`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchActionRequest {
    pub action_id: String,
    /// Session form data plus `currentStepId`.
    pub form_data: Map<String, JsonValue>,
    pub run_data: IndexMap<String, JsonValue>,
}

/// Body of `PUT /runs/{runId}/state`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunStateUpdate {
    pub current_step_id: String,
    pub form_data: IndexMap<String, Map<String, JsonValue>>,
}
