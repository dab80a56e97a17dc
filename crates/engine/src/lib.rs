//! # Toolkit Engine
//!
//! The Toolkit Engine interprets declarative tool definitions at runtime. A
//! tool is a graph of steps; each step renders fields, and advancing a step
//! runs an ordered list of actions against a remote backend.
//!
//! ## Key Features
//!
//! - **Wizard State Machine**: step history, validation and navigation ([`Wizard`])
//! - **Action Orchestration**: ordered, conditional, short-circuiting action sequences
//! - **Job Polling**: fire-and-poll worker actions resumed on completion
//! - **Field Dependencies**: visibility rules, option lookups and cascading resets
//! - **Grid Editing**: capability-gated row and cell mutations with stable row ids
//!
//! ## Usage
//!
//! ```rust
//! use toolkit_engine::parse_tool_file;
//!
//! let temp_dir = tempfile::tempdir()?;
//! let tool_path = temp_dir.path().join("sheet-builder.json");
//! std::fs::write(&tool_path, r#"{ "id": "sheet-builder", "name": "Sheet Builder", "steps": [{ "id": "start" }] }"#)?;
//!
//! let tool = parse_tool_file(&tool_path)?;
//! assert_eq!(tool.steps.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`condition`**: predicate evaluation over a data bag
//! - **`path`**: dotted-path parsing and the single lookup resolver
//! - **`visibility`**: visible fields, option sets and the dependency graph
//! - **`grid`**: per-step grid rows and capability flags
//! - **`orchestrator`**: submit sequence execution
//! - **`poller`**: worker job status checks
//! - **`wizard`**: the public state machine tying the above together

use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use toolkit_types::ToolDefinition;

pub mod backend;
pub mod condition;
pub mod config;
pub mod error;
pub mod grid;
pub mod orchestrator;
pub mod path;
pub mod poller;
pub mod session;
pub mod telemetry;
pub mod visibility;
pub mod wizard;

// Re-export commonly used types for convenience
pub use backend::{ActionBackend, ApiRequest, HttpActionBackend};
pub use config::EngineConfig;
pub use error::{EngineError, StepError, StepErrorKind};
pub use grid::{Capabilities, GridRow, GridState};
pub use orchestrator::{ActionOrchestrator, SequenceOutcome};
pub use poller::{JobPoller, PollOutcome};
pub use session::{FormData, Job, MessageLevel, ResponseData, Session, StepMessage, ValidationErrors};
pub use telemetry::{ActionStatus, ActionTelemetry, ActionTelemetryEvent};
pub use visibility::{DependencyGraph, FieldView};
pub use wizard::{ProgressEntry, ProgressMarker, StepOutcome, Wizard, WizardState};

/// Loads a tool definition from the filesystem.
///
/// `.json` files are parsed as JSON; anything else is parsed as YAML, which
/// also accepts JSON. A definition without an `id` takes the file stem.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid JSON/YAML, or
/// does not describe a tool with at least one step.
pub fn parse_tool_file(file_path: impl AsRef<Path>) -> Result<ToolDefinition> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read tool file: {}", file_path.display()))?;

    let is_json = file_path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

    let mut tool: ToolDefinition = if is_json {
        serde_json::from_str(&content).with_context(|| format!("Invalid tool JSON: {}", file_path.display()))?
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid tool YAML: {}", file_path.display()))?
    };

    if tool.id.trim().is_empty()
        && let Some(stem) = file_path.file_stem().and_then(|stem| stem.to_str())
    {
        tool.id = stem.to_string();
    }
    if tool.steps.is_empty() {
        bail!("Tool file {} declares no steps", file_path.display());
    }
    Ok(tool)
}
