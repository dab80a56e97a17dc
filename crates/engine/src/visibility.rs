//! Field visibility, option sets and dependent-field resets.
//!
//! Fields on a step can depend on each other in three ways: a visibility rule
//! (`visibility.dependsOn`), an option lookup (`conditionalOptions` or the
//! `dependsOn {fieldId, optionsMap}` form) and a value prefill
//! (`conditionalValues`). Each declaration is an edge from a driver field to a
//! dependent. [`DependencyGraph`] precomputes those edges once per step so a
//! change can clear every transitive dependent in a single breadth-first pass.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use toolkit_types::{DependencyCondition, FieldDefinition, FieldOption, StepDefinition};

use crate::condition::{self, loose_eq};
use crate::path::{Lookup, format_json_value};

/// Adjacency from a driver field to the fields that must reset when it changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn build(step: &StepDefinition) -> Self {
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        let mut add_edge = |driver: &str, dependent: &str| {
            let entry = dependents.entry(driver.to_string()).or_default();
            if driver != dependent && !entry.iter().any(|existing| existing == dependent) {
                entry.push(dependent.to_string());
            }
        };

        for field in &step.fields {
            for driver in field.drivers() {
                add_edge(driver, &field.id);
            }
            for extra in &field.reset {
                add_edge(&field.id, extra);
            }
        }
        Self { dependents }
    }

    /// Direct dependents of `field_id`.
    pub fn direct_dependents(&self, field_id: &str) -> &[String] {
        self.dependents.get(field_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every field reachable from `field_id`, nearest first, excluding the field itself.
    ///
    /// Cyclic declarations terminate because each field is visited once.
    pub fn transitive_dependents(&self, field_id: &str) -> Vec<String> {
        let mut visited: HashSet<&str> = HashSet::from([field_id]);
        let mut queue: VecDeque<&str> = VecDeque::from([field_id]);
        let mut ordered = Vec::new();

        while let Some(current) = queue.pop_front() {
            for dependent in self.direct_dependents(current) {
                if visited.insert(dependent.as_str()) {
                    ordered.push(dependent.clone());
                    queue.push_back(dependent.as_str());
                }
            }
        }
        ordered
    }
}

/// A field as the view should render it right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldView<'a> {
    pub field: &'a FieldDefinition,
    pub value: Option<Value>,
    pub options: Vec<FieldOption>,
    /// Set when the field's options depend on a driver with no matching entry.
    pub disabled: bool,
}

/// Returns the fields of `step` that are currently shown, in authoring order.
pub fn visible_fields<'a>(step: &'a StepDefinition, record: Option<&Map<String, Value>>, data: &impl Lookup) -> Vec<FieldView<'a>> {
    step.fields
        .iter()
        .filter(|field| is_visible(field, record, data))
        .map(|field| {
            let (options, disabled) = options_for(field, record);
            FieldView {
                field,
                value: record.and_then(|record| record.get(&field.id)).cloned(),
                options,
                disabled,
            }
        })
        .collect()
}

/// Applies the visibility rule (against sibling fields) and the display condition (against the bag).
pub fn is_visible(field: &FieldDefinition, record: Option<&Map<String, Value>>, data: &impl Lookup) -> bool {
    if let Some(rule) = &field.visibility {
        let driver = record.and_then(|record| record.get(&rule.depends_on));
        let shown = match rule.condition {
            DependencyCondition::Answered => !is_empty_value(driver),
            DependencyCondition::Eq => match (driver, rule.value.as_ref()) {
                (Some(actual), Some(expected)) => loose_eq(actual, expected),
                _ => false,
            },
        };
        if !shown {
            return false;
        }
    }
    condition::evaluate(field.display_condition.as_ref(), data)
}

/// Admissible options for `field`; the flag is true when a lookup found no entry.
pub fn options_for(field: &FieldDefinition, record: Option<&Map<String, Value>>) -> (Vec<FieldOption>, bool) {
    let lookup: Option<(&str, &IndexMap<String, Vec<FieldOption>>)> = field
        .conditional_options
        .as_ref()
        .map(|options| (options.depends_on.as_str(), &options.options))
        .or_else(|| {
            field
                .depends_on
                .as_ref()
                .map(|options| (options.field_id.as_str(), &options.options_map))
        });

    let Some((driver_id, table)) = lookup else {
        return (field.options.clone(), false);
    };
    let key = record.and_then(|record| record.get(driver_id)).map(option_key);
    match key.and_then(|key| table.get(&key)) {
        Some(options) if !options.is_empty() => (options.clone(), false),
        _ => (Vec::new(), true),
    }
}

/// Prefill value for `field` given its driver's current value.
pub fn conditional_value(field: &FieldDefinition, record: &Map<String, Value>) -> Option<Value> {
    let values = field.conditional_values.as_ref()?;
    let key = option_key(record.get(&values.depends_on)?);
    values.values.get(&key).cloned()
}

/// Lookup key for a driver value: `{value, label}` objects key by `value`.
pub fn option_key(value: &Value) -> String {
    match value {
        Value::Object(map) => map.get("value").map(format_json_value).unwrap_or_default(),
        other => format_json_value(other),
    }
}

/// Null, missing, blank text and empty lists are all unanswered.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}
