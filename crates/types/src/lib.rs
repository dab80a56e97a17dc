//! Shared types for the tool catalog wizard.
//!
//! `tool` holds the declarative document the engine interprets; `run` holds
//! the payloads exchanged with the backend while worker jobs execute.

pub mod run;
pub mod tool;

pub use run::{
    DispatchActionRequest, JobHistoryEntry, JobResult, JobStatus, JobStatusReport, RunRecord, RunStateUpdate, StartRunRequest,
    StartRunResponse,
};
pub use tool::{
    ActionCondition, ActionKind, ActionSpec, CapabilityFlag, Condition, ConditionOperator, ConditionalOptions, ConditionalValues,
    DependencyCondition, EditFeatures, ErrorRoute, FieldDefinition, FieldDependency, FieldKind, FieldOption, GridColumn,
    GridColumnKind, OptionsMapDependency, StepDefinition, StepKind, ToolDefinition, validation::validate_tool_definition,
};
