//! Per-step tabular state for grid steps.
//!
//! A grid step reads its rows from the response alias named by `dataSource`.
//! Rows keep a stable identifier for their whole life so edits and deletes
//! address rows by id, never by position. Each mutation kind is gated by a
//! capability flag; a disabled capability turns the mutation into a no-op.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use toolkit_types::{CapabilityFlag, GridColumn, GridColumnKind, StepDefinition};
use tracing::debug;

use crate::condition::evaluate_gate;
use crate::path::{Lookup, format_json_value};

/// One row; `id` is caller visible and never reused within a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRow {
    pub id: String,
    #[serde(flatten)]
    pub cells: Map<String, Value>,
}

impl GridRow {
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.cells.len() + 1);
        object.insert("id".to_string(), Value::String(self.id.clone()));
        for (key, value) in &self.cells {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GridState {
    pub columns: Vec<GridColumn>,
    pub rows: Vec<GridRow>,
}

impl GridState {
    pub fn row(&self, row_id: &str) -> Option<&GridRow> {
        self.rows.iter().find(|row| row.id == row_id)
    }

    /// Rows as the JSON array mirrored into form data.
    pub fn rows_value(&self) -> Value {
        Value::Array(self.rows.iter().map(GridRow::to_value).collect())
    }
}

/// Mutations currently permitted on a grid step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub add_row: bool,
    pub delete_row: bool,
    pub edit_cells: bool,
}

impl Capabilities {
    /// Derives capabilities from `editFeatures`, falling back to the legacy `editable` switch.
    pub fn for_step(step: &StepDefinition, data: &impl Lookup) -> Self {
        let Some(features) = &step.edit_features else {
            let editable = step.editable.unwrap_or(false);
            return Self {
                add_row: editable,
                delete_row: editable,
                edit_cells: editable,
            };
        };
        let allowed = |flag: &Option<CapabilityFlag>| {
            flag.as_ref()
                .is_some_and(|flag| flag.enabled && evaluate_gate(flag.condition.as_ref(), data))
        };
        Self {
            add_row: allowed(&features.add_row),
            delete_row: allowed(&features.delete_row),
            edit_cells: allowed(&features.grid_text),
        }
    }
}

/// Grid state for every grid step seen in the session, plus the row id allocator.
#[derive(Debug, Clone, Default)]
pub struct GridStore {
    grids: IndexMap<String, GridState>,
    issued_ids: HashSet<String>,
    next_id: u64,
}

impl GridStore {
    pub fn get(&self, step_id: &str) -> Option<&GridState> {
        self.grids.get(step_id)
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.grids.contains_key(step_id)
    }

    /// Replaces the grid for `step_id` with rows parsed from a stored result.
    ///
    /// Accepts `{rows, schema|columns}` or a bare array of row objects. Rows
    /// without an id, or repeating an id already used in this grid, get a
    /// fresh one; columns default to the keys of the first row when no schema
    /// is given.
    pub fn seed(&mut self, step_id: &str, source: &Value) -> &GridState {
        let (rows_value, columns_value) = match source {
            Value::Array(_) => (Some(source), None),
            Value::Object(map) => (map.get("rows"), map.get("schema").or_else(|| map.get("columns"))),
            _ => (None, None),
        };

        let mut columns: Vec<GridColumn> = columns_value
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();

        let mut rows = Vec::new();
        let mut used: HashSet<String> = HashSet::new();
        for raw in rows_value.and_then(Value::as_array).into_iter().flatten() {
            let Value::Object(object) = raw else {
                continue;
            };
            let mut cells = object.clone();
            let source_id = cells
                .remove("id")
                .map(|id| format_json_value(&id))
                .filter(|id| !id.trim().is_empty() && !used.contains(id));
            let id = match source_id {
                Some(id) => {
                    self.issued_ids.insert(id.clone());
                    id
                }
                None => self.allocate_id(),
            };
            used.insert(id.clone());
            rows.push(GridRow { id, cells });
        }

        if columns.is_empty()
            && let Some(first) = rows.first()
        {
            columns = first
                .cells
                .keys()
                .map(|key| GridColumn {
                    key: key.clone(),
                    label: key.clone(),
                    kind: GridColumnKind::Text,
                    options: Vec::new(),
                })
                .collect();
        }

        debug!(step_id, rows = rows.len(), columns = columns.len(), "seeded grid");
        self.grids.insert(step_id.to_string(), GridState { columns, rows });
        &self.grids[step_id]
    }

    /// Sets one cell. Returns whether anything changed.
    pub fn update_cell(&mut self, step_id: &str, capabilities: Capabilities, row_id: &str, column: &str, value: Value) -> bool {
        if !capabilities.edit_cells {
            debug!(step_id, row_id, "cell edit refused: capability disabled");
            return false;
        }
        let Some(row) = self
            .grids
            .get_mut(step_id)
            .and_then(|grid| grid.rows.iter_mut().find(|row| row.id == row_id))
        else {
            return false;
        };
        row.cells.insert(column.to_string(), value);
        true
    }

    /// Appends a row with schema defaults and returns its id.
    pub fn add_row(&mut self, step_id: &str, capabilities: Capabilities) -> Option<String> {
        if !capabilities.add_row {
            debug!(step_id, "add row refused: capability disabled");
            return None;
        }
        let id = self.allocate_id();
        let grid = self.grids.entry(step_id.to_string()).or_default();
        let cells = grid
            .columns
            .iter()
            .map(|column| (column.key.clone(), default_cell(column)))
            .collect();
        grid.rows.push(GridRow { id: id.clone(), cells });
        Some(id)
    }

    /// Removes the row with `row_id`. Returns whether a row was removed.
    pub fn delete_row(&mut self, step_id: &str, capabilities: Capabilities, row_id: &str) -> bool {
        if !capabilities.delete_row {
            debug!(step_id, row_id, "delete row refused: capability disabled");
            return false;
        }
        let Some(grid) = self.grids.get_mut(step_id) else {
            return false;
        };
        let before = grid.rows.len();
        grid.rows.retain(|row| row.id != row_id);
        grid.rows.len() != before
    }

    fn allocate_id(&mut self) -> String {
        loop {
            self.next_id += 1;
            let candidate = format!("row-{}", self.next_id);
            if self.issued_ids.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

fn default_cell(column: &GridColumn) -> Value {
    match column.kind {
        GridColumnKind::Checkbox => Value::Bool(false),
        GridColumnKind::Select => Value::String(column.options.first().cloned().unwrap_or_default()),
        GridColumnKind::Text => Value::String(String::new()),
    }
}
