//! The wizard state machine.
//!
//! [`Wizard`] owns the loaded definition, the [`Session`] and the backend.
//! Every public operation catches its own failures and records them as state,
//! so a view only ever reads [`Wizard::state`] and the session accessors.
//!
//! ```text
//! Unloaded -> Loading -> Ready(step) -> Ready(next) | Failed(step) | AwaitingJob(step) | Completed
//!                     \-> LoadFailed
//! ```

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tokio::time::{MissedTickBehavior, interval};
use toolkit_api::ToolkitClient;
use toolkit_types::{JobResult, StepDefinition, StepKind, ToolDefinition};
use tracing::{debug, info, warn};

use crate::backend::{ActionBackend, HttpActionBackend};
use crate::config::EngineConfig;
use crate::error::{EngineError, StepError};
use crate::grid::{Capabilities, GridState};
use crate::orchestrator::{ActionOrchestrator, SequenceOutcome};
use crate::path::DataBag;
use crate::poller::{JobPoller, PollOutcome};
use crate::session::{Job, Session, StepMessage, ValidationErrors};
use crate::telemetry::ActionTelemetry;
use crate::visibility::{self, DependencyGraph, FieldView, is_empty_value};

/// Externally visible lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum WizardState {
    Unloaded,
    Loading,
    /// The definition could not be fetched; there is no current step.
    LoadFailed { message: String },
    Ready { step_id: String },
    /// A worker job is running; advancing is refused until it settles.
    AwaitingJob { step_id: String, action_id: String },
    /// The step's last attempt failed. The step can be edited and retried.
    Failed { step_id: String, message: String },
    Completed,
}

/// Result of an operation that may move the wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Stale or illegal request; nothing changed.
    Ignored,
    /// Required visible fields are empty; see the validation errors.
    Invalid,
    AwaitingJob,
    Navigated(String),
    Failed,
    Completed,
}

/// Progress tracker marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressMarker {
    Completed,
    Active,
    Upcoming,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub step_id: String,
    pub title: String,
    pub marker: ProgressMarker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Unloaded,
    Loading,
    LoadFailed(String),
    Running,
    Completed,
}

pub struct Wizard<B: ActionBackend> {
    backend: B,
    config: EngineConfig,
    poller: JobPoller,
    tool: Option<ToolDefinition>,
    graphs: HashMap<String, DependencyGraph>,
    session: Session,
    phase: Phase,
}

impl Wizard<HttpActionBackend> {
    /// Builds a wizard talking HTTP to `config.api_base_url`.
    pub fn from_config(config: EngineConfig) -> Result<Self, EngineError> {
        let client = ToolkitClient::new(config.api_base_url.clone())?;
        Ok(Self::new(HttpActionBackend::new(client), config))
    }
}

impl<B: ActionBackend> Wizard<B> {
    pub fn new(backend: B, config: EngineConfig) -> Self {
        let poller = JobPoller::new(config.poll_interval());
        Self {
            backend,
            config,
            poller,
            tool: None,
            graphs: HashMap::new(),
            session: Session::default(),
            phase: Phase::Unloaded,
        }
    }

    /// Resets the session and fetches `tool_id` from the catalog.
    pub async fn load_tool(&mut self, tool_id: &str) {
        self.reset_tool();
        self.phase = Phase::Loading;
        info!(tool_id, "loading tool");

        match self.backend.fetch_tool(tool_id).await {
            Ok(tool) => self.install(tool),
            Err(source) => {
                let error = EngineError::Load {
                    tool_id: tool_id.to_string(),
                    source,
                };
                warn!(tool_id, %error, "tool load failed");
                self.phase = Phase::LoadFailed(error.to_string());
            }
        }
    }

    /// Resets the session and installs an already parsed definition.
    pub fn load_definition(&mut self, tool: ToolDefinition) {
        self.reset_tool();
        self.install(tool);
    }

    /// Clears all session state and unloads the definition. Any pending job is dropped.
    pub fn reset_tool(&mut self) {
        if self.session.has_pending_job() {
            debug!("dropping pending job on reset");
        }
        self.session.reset();
        self.tool = None;
        self.graphs.clear();
        self.phase = Phase::Unloaded;
    }

    /// Starts the loaded tool over from its first step without refetching it.
    pub fn restart(&mut self) {
        let Some(first) = self.tool.as_ref().and_then(ToolDefinition::first_step).map(|step| step.id.clone()) else {
            return;
        };
        self.session.reset();
        self.session.history.push(first.clone());
        self.enter_step(&first);
        self.phase = Phase::Running;
        info!(step_id = %first, "wizard restarted");
    }

    /// Validates and submits `step_id`, which must be the current step.
    pub async fn advance_step(&mut self, step_id: &str) -> StepOutcome {
        if self.phase != Phase::Running {
            debug!(step_id, "advance ignored: wizard not running");
            return StepOutcome::Ignored;
        }
        if self.session.current_step() != Some(step_id) {
            debug!(step_id, current = ?self.session.current_step(), "advance ignored: stale step");
            return StepOutcome::Ignored;
        }
        if self.session.loading || self.session.has_pending_job() {
            debug!(step_id, "advance ignored: step busy");
            return StepOutcome::Ignored;
        }

        self.session.clear_step_feedback();
        let Some(tool) = self.tool.as_ref() else {
            return StepOutcome::Ignored;
        };
        let Some(step) = tool.step(step_id) else {
            return StepOutcome::Ignored;
        };

        let errors = required_field_errors(step, &self.session);
        if !errors.is_empty() {
            info!(step_id, fields = ?errors.keys().collect::<Vec<_>>(), "required fields missing");
            self.session.validation_errors = errors;
            return StepOutcome::Invalid;
        }

        self.session.loading = true;
        let outcome = ActionOrchestrator::new(&self.backend)
            .run(tool, step, &mut self.session, 0)
            .await;
        self.apply_outcome(step_id, outcome, None)
    }

    /// Returns to the previous step. Answers and stored results are kept.
    pub fn go_back(&mut self) -> bool {
        if self.phase != Phase::Running || self.session.loading || self.session.history.len() <= 1 {
            return false;
        }
        let left = self.session.history.pop();
        self.session.clear_step_feedback();
        info!(from = ?left, to = ?self.session.current_step(), "navigated back");
        true
    }

    /// Stores a field value on the current step and clears every dependent field.
    ///
    /// Returns the ids of the fields that were reset.
    pub fn update_field(&mut self, field_id: &str, value: Value) -> Vec<String> {
        if self.phase != Phase::Running || self.session.loading {
            return Vec::new();
        }
        let Some(step_id) = self.session.current_step().map(str::to_string) else {
            return Vec::new();
        };
        self.session.clear_step_feedback();

        let changed = self.session.field_value(&step_id, field_id) != Some(&value);
        self.session.set_field(&step_id, field_id, value);
        if !changed {
            return Vec::new();
        }

        let reset = self
            .graphs
            .get(&step_id)
            .map(|graph| graph.transitive_dependents(field_id))
            .unwrap_or_default();
        for dependent in &reset {
            self.session.set_field(&step_id, dependent, Value::String(String::new()));
        }

        if let Some(step) = self.tool.as_ref().and_then(|tool| tool.step(&step_id)) {
            let prefills: Vec<(String, Value)> = match self.session.form_data.get(&step_id) {
                Some(record) => step
                    .fields
                    .iter()
                    .filter(|field| field.conditional_values.as_ref().is_some_and(|values| values.depends_on == field_id))
                    .filter_map(|field| visibility::conditional_value(field, record).map(|value| (field.id.clone(), value)))
                    .collect(),
                None => Vec::new(),
            };
            for (id, value) in prefills {
                self.session.set_field(&step_id, &id, value);
            }
        }

        if !reset.is_empty() {
            debug!(step_id = %step_id, field_id, reset = ?reset, "reset dependent fields");
        }
        reset
    }

    /// Edits one grid cell on the current grid step.
    pub fn update_cell(&mut self, row_id: &str, column: &str, value: Value) -> bool {
        let Some((step_id, capabilities)) = self.grid_context() else {
            return false;
        };
        let changed = self.session.grids.update_cell(&step_id, capabilities, row_id, column, value);
        if changed {
            self.mirror_grid(&step_id);
        }
        changed
    }

    /// Appends a row to the current grid step and returns its id.
    pub fn add_row(&mut self) -> Option<String> {
        let (step_id, capabilities) = self.grid_context()?;
        let row_id = self.session.grids.add_row(&step_id, capabilities)?;
        self.mirror_grid(&step_id);
        Some(row_id)
    }

    /// Deletes a row of the current grid step by id.
    pub fn delete_row(&mut self, row_id: &str) -> bool {
        let Some((step_id, capabilities)) = self.grid_context() else {
            return false;
        };
        let removed = self.session.grids.delete_row(&step_id, capabilities, row_id);
        if removed {
            self.mirror_grid(&step_id);
        }
        removed
    }

    /// Performs one status check for the pending job and applies the result.
    pub async fn poll_job(&mut self) -> StepOutcome {
        let Some(job) = self.session.job.clone().filter(|job| !job.status.is_terminal()) else {
            return StepOutcome::Ignored;
        };

        match self.poller.poll_once(&self.backend, &job).await {
            PollOutcome::Pending(status) => {
                if let Some(active) = self.session.job.as_mut() {
                    active.status = status;
                }
                StepOutcome::AwaitingJob
            }
            PollOutcome::Completed(result) => self.resume_after_job(job, result).await,
            PollOutcome::Failed(message) => self.fail_job(&job, message),
            PollOutcome::Errored(error) => {
                self.session.job = None;
                self.session.loading = false;
                self.session.error = Some(error);
                StepOutcome::Failed
            }
        }
    }

    /// Polls on the configured interval until no job is pending.
    pub async fn await_job(&mut self) -> StepOutcome {
        let mut ticker = interval(self.poller.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut outcome = StepOutcome::Ignored;
        while self.session.has_pending_job() {
            ticker.tick().await;
            outcome = self.poll_job().await;
        }
        outcome
    }

    pub fn state(&self) -> WizardState {
        match &self.phase {
            Phase::Unloaded => WizardState::Unloaded,
            Phase::Loading => WizardState::Loading,
            Phase::LoadFailed(message) => WizardState::LoadFailed { message: message.clone() },
            Phase::Completed => WizardState::Completed,
            Phase::Running => {
                let step_id = self.session.current_step().unwrap_or_default().to_string();
                if let Some(job) = self.session.job.as_ref().filter(|job| !job.status.is_terminal()) {
                    WizardState::AwaitingJob {
                        step_id,
                        action_id: job.action_id.clone(),
                    }
                } else if let Some(error) = &self.session.error {
                    WizardState::Failed {
                        step_id,
                        message: error.message.clone(),
                    }
                } else {
                    WizardState::Ready { step_id }
                }
            }
        }
    }

    /// Fields of the current step that are shown right now.
    pub fn visible_fields(&self) -> Vec<FieldView<'_>> {
        let Some(step) = self.current_step() else {
            return Vec::new();
        };
        let bag = DataBag::new(&self.session.form_data, &self.session.response_data, Some(&step.id));
        visibility::visible_fields(step, self.session.form_data.get(&step.id), &bag)
    }

    /// Grid state of the current step, if it is a seeded grid step.
    pub fn grid(&self) -> Option<&GridState> {
        let step = self.current_step().filter(|step| step.kind == StepKind::Grid)?;
        self.session.grids.get(&step.id)
    }

    /// Grid mutations currently permitted on the current step.
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.grid_context().map(|(_, capabilities)| capabilities)
    }

    /// Form, prompt and grid steps with their progress markers.
    pub fn progress(&self) -> Vec<ProgressEntry> {
        let Some(tool) = &self.tool else {
            return Vec::new();
        };
        let current = self.session.current_step();
        let finished = self.phase == Phase::Completed;
        tool.steps
            .iter()
            .filter(|step| step.kind.is_interactive())
            .map(|step| {
                let visited = self.session.history.iter().any(|id| id == &step.id);
                let marker = if !finished && current == Some(step.id.as_str()) {
                    ProgressMarker::Active
                } else if visited {
                    ProgressMarker::Completed
                } else {
                    ProgressMarker::Upcoming
                };
                ProgressEntry {
                    step_id: step.id.clone(),
                    title: step.title.clone(),
                    marker,
                }
            })
            .collect()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn tool(&self) -> Option<&ToolDefinition> {
        self.tool.as_ref()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn current_step(&self) -> Option<&StepDefinition> {
        let step_id = self.session.current_step()?;
        self.tool.as_ref()?.step(step_id)
    }

    pub fn history(&self) -> &[String] {
        &self.session.history
    }

    pub fn validation_errors(&self) -> &ValidationErrors {
        &self.session.validation_errors
    }

    pub fn error(&self) -> Option<&StepError> {
        self.session.error.as_ref()
    }

    pub fn message(&self) -> Option<&StepMessage> {
        self.session.message.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.session.loading
    }

    pub fn job(&self) -> Option<&Job> {
        self.session.job.as_ref()
    }

    pub fn telemetry(&self) -> &ActionTelemetry {
        &self.session.telemetry
    }

    fn install(&mut self, tool: ToolDefinition) {
        let Some(first) = tool.first_step().map(|step| step.id.clone()) else {
            let error = EngineError::definition(format!("tool '{}' declares no steps", tool.id));
            warn!(tool_id = %tool.id, %error, "tool load failed");
            self.phase = Phase::LoadFailed(error.to_string());
            return;
        };

        self.graphs = tool
            .steps
            .iter()
            .map(|step| (step.id.clone(), DependencyGraph::build(step)))
            .collect();
        info!(tool_id = %tool.id, steps = tool.steps.len(), first_step = %first, "tool loaded");
        self.tool = Some(tool);
        self.session.history.push(first.clone());
        self.enter_step(&first);
        self.phase = Phase::Running;
    }

    fn apply_outcome(&mut self, step_id: &str, outcome: SequenceOutcome, server_next: Option<String>) -> StepOutcome {
        match outcome {
            SequenceOutcome::Finished { navigate_to: Some(target) } => {
                self.session.loading = false;
                self.go_to(&target)
            }
            SequenceOutcome::Finished { navigate_to: None } => {
                self.session.loading = false;
                let Some(tool) = self.tool.as_ref() else {
                    return StepOutcome::Ignored;
                };
                let next = match server_next.filter(|id| id != step_id && tool.step(id).is_some()) {
                    Some(id) => Ok(Some(id)),
                    None => tool
                        .successor_of(step_id)
                        .map(|step| step.map(|step| step.id.clone()))
                        .map_err(str::to_string),
                };
                match next {
                    Ok(Some(next)) => self.go_to(&next),
                    Ok(None) => self.complete(),
                    // go_to records the configuration error for the dangling id.
                    Err(unknown) => {
                        warn!(step_id, next_step_id = %unknown, "nextStepId names an undeclared step");
                        self.go_to(&unknown)
                    }
                }
            }
            SequenceOutcome::Suspended(job) => {
                self.session.job = Some(job);
                StepOutcome::AwaitingJob
            }
            SequenceOutcome::Aborted(error) => {
                self.session.loading = false;
                self.session.error = Some(error);
                StepOutcome::Failed
            }
        }
    }

    async fn resume_after_job(&mut self, job: Job, result: JobResult) -> StepOutcome {
        self.session.job = None;

        let mut refreshed_aliases = Vec::new();
        for (step_id, record) in result.form_data {
            self.session.form_data.entry(step_id).or_default().extend(record);
        }
        for (alias, value) in result.response_data {
            refreshed_aliases.push(alias.clone());
            self.session.response_data.insert(alias, value);
        }
        self.reseed_grids(&refreshed_aliases);

        let Some(tool) = self.tool.as_ref() else {
            self.session.loading = false;
            return StepOutcome::Ignored;
        };
        let Some(step) = tool.step(&job.step_id) else {
            self.session.loading = false;
            return StepOutcome::Ignored;
        };
        let outcome = ActionOrchestrator::new(&self.backend)
            .run(tool, step, &mut self.session, job.resume_from)
            .await;
        self.apply_outcome(&job.step_id, outcome, result.next_step_id)
    }

    fn fail_job(&mut self, job: &Job, message: String) -> StepOutcome {
        self.session.job = None;
        self.session.loading = false;
        self.session.error = Some(StepError::job(message));

        let target = job
            .error_step
            .clone()
            .unwrap_or_else(|| self.config.generic_error_step.clone());
        if self.tool.as_ref().is_some_and(|tool| tool.step(&target).is_some()) {
            self.push_step(&target);
        } else {
            warn!(step_id = %job.step_id, error_step = %target, "error step not declared; staying on step");
        }
        StepOutcome::Failed
    }

    fn go_to(&mut self, target: &str) -> StepOutcome {
        if !self.tool.as_ref().is_some_and(|tool| tool.step(target).is_some()) {
            self.session.error = Some(StepError::configuration(format!("Step '{target}' does not exist.")));
            return StepOutcome::Failed;
        }
        self.push_step(target);
        StepOutcome::Navigated(target.to_string())
    }

    fn push_step(&mut self, target: &str) {
        info!(from = ?self.session.current_step(), to = target, "navigated to step");
        self.session.history.push(target.to_string());
        self.session.validation_errors.clear();
        self.enter_step(target);
    }

    fn complete(&mut self) -> StepOutcome {
        info!(step_id = ?self.session.current_step(), "tool completed");
        self.phase = Phase::Completed;
        self.session.message = Some(StepMessage::info(self.config.completion_message.clone()));
        StepOutcome::Completed
    }

    /// Prefills source-backed fields and seeds an unseeded grid step.
    fn enter_step(&mut self, step_id: &str) {
        let Some(step) = self.tool.as_ref().and_then(|tool| tool.step(step_id)) else {
            return;
        };
        self.session.prefill_from_sources(step);

        if step.kind == StepKind::Grid
            && !self.session.grids.contains(&step.id)
            && let Some(alias) = step.data_source.as_deref()
            && let Some(source) = self.session.response_data.get(alias)
        {
            let rows = self.session.grids.seed(&step.id, source).rows_value();
            self.session.set_field(&step.id, "rows", rows);
        }
    }

    fn reseed_grids(&mut self, aliases: &[String]) {
        let Some(tool) = self.tool.as_ref() else {
            return;
        };
        for step in tool.steps.iter().filter(|step| step.kind == StepKind::Grid) {
            let Some(alias) = step.data_source.as_deref() else {
                continue;
            };
            if !aliases.iter().any(|refreshed| refreshed == alias) {
                continue;
            }
            if let Some(source) = self.session.response_data.get(alias) {
                let rows = self.session.grids.seed(&step.id, source).rows_value();
                self.session.set_field(&step.id, "rows", rows);
            }
        }
    }

    fn grid_context(&self) -> Option<(String, Capabilities)> {
        if self.phase != Phase::Running || self.session.loading {
            return None;
        }
        let step = self.current_step().filter(|step| step.kind == StepKind::Grid)?;
        let bag = DataBag::new(&self.session.form_data, &self.session.response_data, Some(&step.id));
        Some((step.id.clone(), Capabilities::for_step(step, &bag)))
    }

    fn mirror_grid(&mut self, step_id: &str) {
        self.session.clear_step_feedback();
        if let Some(rows) = self.session.grids.get(step_id).map(GridState::rows_value) {
            self.session.set_field(step_id, "rows", rows);
        }
    }
}

/// Validation messages for required fields that are visible and empty.
fn required_field_errors(step: &StepDefinition, session: &Session) -> ValidationErrors {
    let record = session.form_data.get(&step.id);
    let bag = DataBag::new(&session.form_data, &session.response_data, Some(&step.id));
    visibility::visible_fields(step, record, &bag)
        .into_iter()
        .filter(|view| view.field.required && is_empty_value(view.value.as_ref()))
        .map(|view| (view.field.id.clone(), format!("{} is required.", view.field.display_label())))
        .collect()
}
