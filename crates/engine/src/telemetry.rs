use chrono::{DateTime, Utc};
use serde::Serialize;
use toolkit_types::ActionKind;

/// Outcome of one action within a submit sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionStatus {
    Skipped,
    Succeeded,
    Failed,
    /// A worker was dispatched and the sequence is waiting on its job.
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTelemetryEvent {
    pub step_id: String,
    pub index: usize,
    pub kind: ActionKind,
    pub status: ActionStatus,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only log of action outcomes for the session.
#[derive(Debug, Clone, Default)]
pub struct ActionTelemetry {
    events: Vec<ActionTelemetryEvent>,
}

impl ActionTelemetry {
    pub(crate) fn record(&mut self, step_id: &str, index: usize, kind: ActionKind, status: ActionStatus) {
        self.events.push(ActionTelemetryEvent {
            step_id: step_id.to_string(),
            index,
            kind,
            status,
            recorded_at: Utc::now(),
        });
    }

    pub fn events(&self) -> &[ActionTelemetryEvent] {
        &self.events
    }

    /// Events for one step, in the order they were recorded.
    pub fn for_step<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a ActionTelemetryEvent> + 'a {
        self.events.iter().filter(move |event| event.step_id == step_id)
    }
}
