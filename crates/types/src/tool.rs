//! Strongly typed tool definition schema shared by the engine and the CLI.
//!
//! A tool is declared, not coded: a JSON document lists the wizard steps, the
//! fields each step renders, and the ordered actions that run when the user
//! advances. The models here keep authoring order (via `IndexMap` and `Vec`)
//! so the engine can render fields and execute actions in the sequence they
//! were written.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

pub mod validation;

/// A complete tool: metadata plus the step graph interpreted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Canonical identifier used to fetch the tool (for example, `sheet-builder`).
    #[serde(default)]
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Optional summary copy.
    #[serde(default)]
    pub description: Option<String>,
    /// Steps in declaration order. The first step is the wizard entry point.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl ToolDefinition {
    /// Returns the step declared with `step_id`.
    pub fn step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    /// Returns the position of `step_id` in declaration order.
    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.id == step_id)
    }

    /// Returns the entry step of the wizard.
    pub fn first_step(&self) -> Option<&StepDefinition> {
        self.steps.first()
    }

    /// Resolves the step that follows `step_id` when its action sequence finishes.
    ///
    /// `nextStepId` wins; otherwise the next step in declaration order. Terminal
    /// step kinds (success and error sinks) and the last declared step have no
    /// successor.
    ///
    /// # Errors
    ///
    /// Returns the dangling id when `nextStepId` names an undeclared step.
    pub fn successor_of<'a>(&'a self, step_id: &str) -> Result<Option<&'a StepDefinition>, &'a str> {
        let Some(index) = self.step_index(step_id) else {
            return Ok(None);
        };
        let step = &self.steps[index];
        if step.kind.is_terminal() {
            return Ok(None);
        }
        match step.next_step_id.as_deref() {
            Some(next_id) => self.step(next_id).map(Some).ok_or(next_id),
            None => Ok(self.steps.get(index + 1)),
        }
    }
}

/// One node of the wizard graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Step identifier, authored as `id` or `stepId`.
    #[serde(alias = "stepId")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Descriptive copy, authored as `description` or `content`.
    #[serde(default, alias = "content")]
    pub description: Option<String>,
    /// Step kind; drives validation, grid handling and completion.
    #[serde(rename = "type", default)]
    pub kind: StepKind,
    /// Fields rendered on this step, in authoring order.
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    /// ResponseData alias backing a grid step.
    #[serde(default)]
    pub data_source: Option<String>,
    /// Explicit successor step.
    #[serde(default)]
    pub next_step_id: Option<String>,
    /// Ordered action list executed on advance. Accepts a single object or a list.
    #[serde(default, deserialize_with = "one_or_many")]
    pub on_submit: Vec<ActionSpec>,
    /// Grid capability flags.
    #[serde(default)]
    pub edit_features: Option<EditFeatures>,
    /// Legacy all-or-nothing grid edit switch used when `editFeatures` is absent.
    #[serde(default)]
    pub editable: Option<bool>,
}

/// Closed set of step kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    #[default]
    Form,
    /// Form step whose API bodies are wrapped in `{promptContext, data}`.
    Prompt,
    /// Tabular step backed by a ResponseData alias.
    Grid,
    Success,
    Error,
}

impl StepKind {
    /// Success and error sinks end the wizard when advanced.
    pub fn is_terminal(self) -> bool {
        matches!(self, StepKind::Success | StepKind::Error)
    }

    /// Step kinds shown in the progress tracker.
    pub fn is_interactive(self) -> bool {
        matches!(self, StepKind::Form | StepKind::Prompt | StepKind::Grid)
    }
}

/// One declarative unit of work inside a step's submit sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    pub action: ActionKind,
    /// Identifier reported to the backend for worker actions.
    #[serde(default)]
    pub action_id: Option<String>,
    /// Gate; when it evaluates false the action is skipped.
    #[serde(default)]
    pub condition: Option<ActionCondition>,
    #[serde(default)]
    pub api_endpoint: Option<String>,
    /// HTTP method, `POST` when absent.
    #[serde(default)]
    pub method: Option<String>,
    /// Request key to dotted path (`stepId.fieldId` or bare `fieldId`).
    #[serde(default)]
    pub input_mapping: IndexMap<String, String>,
    /// Forces the `{promptContext, data}` body shape on non-prompt steps.
    #[serde(default)]
    pub prompt: bool,
    #[serde(default)]
    pub prompt_context: Option<String>,
    /// Alias for the (unwrapped) response.
    #[serde(default)]
    pub store_response_as: Option<String>,
    /// Alias used by local capture actions.
    #[serde(default)]
    pub store_data_as: Option<String>,
    /// Literal payload captured by a local action when no mapping is declared.
    #[serde(default)]
    pub data_to_store: Option<JsonValue>,
    /// Field appended to the endpoint for `getSheetInfo` GET requests. Defaults to `sheetId`.
    #[serde(default)]
    pub id_field: Option<String>,
    /// Navigation target for `navigation` actions.
    #[serde(default)]
    pub go_to_step: Option<String>,
    /// Failure route for worker actions.
    #[serde(default)]
    pub on_error: Option<ErrorRoute>,
}

impl ActionSpec {
    /// Alias under which the action result is stored, if any.
    pub fn result_alias(&self) -> Option<&str> {
        self.store_response_as.as_deref().or(self.store_data_as.as_deref())
    }
}

/// Closed set of action kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    #[default]
    CallApi,
    GetSheetInfo,
    StoreLocal,
    Worker,
    Navigation,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::CallApi => "callApi",
            ActionKind::GetSheetInfo => "getSheetInfo",
            ActionKind::StoreLocal => "storeLocal",
            ActionKind::Worker => "worker",
            ActionKind::Navigation => "navigation",
        }
    }
}

/// The narrow `{when, equals}` gate used by actions and grid capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionCondition {
    pub when: String,
    pub equals: JsonValue,
}

impl From<&ActionCondition> for Condition {
    fn from(condition: &ActionCondition) -> Self {
        Condition {
            key: condition.when.clone(),
            operator: ConditionOperator::Equals,
            value: Some(condition.equals.clone()),
        }
    }
}

/// Route taken when a worker job fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRoute {
    pub go_to_step: String,
}

/// General visibility predicate evaluated against a data bag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// Dotted path of the value under test.
    pub key: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Option<JsonValue>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    IsLessThan,
    IsGreaterThan,
    Exists,
    NotExists,
    /// Anything the engine does not understand; never matches.
    #[serde(other)]
    Unsupported,
}

/// A field rendered on a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<FieldOption>,
    /// Hidden unless the driver field is answered or equals a value.
    #[serde(default)]
    pub visibility: Option<FieldDependency>,
    /// General condition evaluated against the data bag.
    #[serde(default)]
    pub display_condition: Option<Condition>,
    /// Options looked up by the driver field's current value.
    #[serde(default)]
    pub conditional_options: Option<ConditionalOptions>,
    /// Short option-map form: `{fieldId, optionsMap}`.
    #[serde(default)]
    pub depends_on: Option<OptionsMapDependency>,
    /// Values prefilled from a lookup on the driver field's current value.
    #[serde(default)]
    pub conditional_values: Option<ConditionalValues>,
    /// Extra fields cleared whenever this one changes.
    #[serde(default)]
    pub reset: Vec<String>,
    /// ResponseData alias this field is prefilled from.
    #[serde(default)]
    pub source_data_key: Option<String>,
    /// Key inside the `sourceDataKey` payload.
    #[serde(default)]
    pub source_data_path: Option<String>,
}

impl FieldDefinition {
    /// Label used in validation messages; falls back to the field id.
    pub fn display_label(&self) -> &str {
        if self.label.trim().is_empty() { &self.id } else { &self.label }
    }

    /// Every field this one depends on, for visibility, options or values.
    pub fn drivers(&self) -> Vec<&str> {
        let mut drivers = Vec::new();
        if let Some(visibility) = &self.visibility {
            drivers.push(visibility.depends_on.as_str());
        }
        if let Some(options) = &self.conditional_options {
            drivers.push(options.depends_on.as_str());
        }
        if let Some(options) = &self.depends_on {
            drivers.push(options.field_id.as_str());
        }
        if let Some(values) = &self.conditional_values {
            drivers.push(values.depends_on.as_str());
        }
        drivers.sort_unstable();
        drivers.dedup();
        drivers
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Input,
    Textarea,
    Number,
    Select,
    Dropdown,
    File,
    Upload,
    Grid,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldOption {
    pub value: String,
    pub label: String,
}

/// How a dependent field reacts to its driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyCondition {
    /// The driver holds a non-empty value.
    #[default]
    Answered,
    /// The driver equals the declared value.
    Eq,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldDependency {
    pub depends_on: String,
    #[serde(default)]
    pub condition: DependencyCondition,
    #[serde(default)]
    pub value: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalOptions {
    pub depends_on: String,
    /// Option lists keyed by the driver's current value.
    #[serde(default)]
    pub options: IndexMap<String, Vec<FieldOption>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptionsMapDependency {
    pub field_id: String,
    #[serde(default)]
    pub options_map: IndexMap<String, Vec<FieldOption>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalValues {
    pub depends_on: String,
    /// Prefill values keyed by the driver's current value.
    #[serde(default)]
    pub values: IndexMap<String, JsonValue>,
}

/// Grid capability flags; each mutation kind is switched independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EditFeatures {
    #[serde(default)]
    pub add_row: Option<CapabilityFlag>,
    #[serde(default)]
    pub delete_row: Option<CapabilityFlag>,
    #[serde(default)]
    pub grid_text: Option<CapabilityFlag>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilityFlag {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub condition: Option<ActionCondition>,
}

/// Column schema delivered alongside grid rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridColumn {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: GridColumnKind,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GridColumnKind {
    #[default]
    Text,
    Select,
    Checkbox,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<ActionSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(Box<ActionSpec>),
        Many(Vec<ActionSpec>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(action)) => vec![*action],
        Some(OneOrMany::Many(actions)) => actions,
    })
}
