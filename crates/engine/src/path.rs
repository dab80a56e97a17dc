//! Dotted-path addressing into session state.
//!
//! Tool definitions reference earlier answers and stored results with strings
//! such as `getSheetId.sheetId`, `sheetInfo.rows.0.title` or a bare `sheetId`.
//! [`Path`] is the parsed form of those strings and [`Lookup`] is the single
//! resolver every consumer goes through.

use std::{fmt, str::FromStr};

use serde_json::Value;

use crate::session::{FormData, ResponseData};

/// A parsed dotted reference: the first segment picks a scope (an active-step
/// field, a step record or a response alias) and the remaining keys walk into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    pub scope: String,
    pub keys: Vec<String>,
}

impl FromStr for Path {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let mut segments = trimmed.split('.').map(str::trim);
        let scope = segments.next().filter(|segment| !segment.is_empty());
        let Some(scope) = scope else {
            return Err(format!("empty path '{raw}'"));
        };
        let keys: Vec<String> = segments.map(str::to_string).collect();
        if keys.iter().any(String::is_empty) {
            return Err(format!("path '{raw}' has an empty segment"));
        }
        Ok(Self {
            scope: scope.to_string(),
            keys,
        })
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scope)?;
        for key in &self.keys {
            write!(f, ".{key}")?;
        }
        Ok(())
    }
}

/// Anything a [`Path`] can be resolved against.
pub trait Lookup {
    /// Returns the value at `path`, or `None` when any segment is missing.
    fn lookup(&self, path: &Path) -> Option<Value>;

    /// Parses `raw` and resolves it; unparseable paths resolve to nothing.
    fn lookup_str(&self, raw: &str) -> Option<Value> {
        raw.parse::<Path>().ok().and_then(|path| self.lookup(&path))
    }
}

impl Lookup for Value {
    fn lookup(&self, path: &Path) -> Option<Value> {
        let root = self.get(&path.scope)?;
        navigate(root, &path.keys).cloned()
    }
}

/// The data visible to conditions and input mappings while a step is active.
///
/// Scopes are tried in order: a field of the active step, a step record keyed
/// by step id, then a response alias. The first scope that resolves the whole
/// path wins; a scope whose nested keys miss falls through to the next one.
#[derive(Debug, Clone, Copy)]
pub struct DataBag<'a> {
    pub form_data: &'a FormData,
    pub response_data: &'a ResponseData,
    pub active_step: Option<&'a str>,
}

impl<'a> DataBag<'a> {
    pub fn new(form_data: &'a FormData, response_data: &'a ResponseData, active_step: Option<&'a str>) -> Self {
        Self {
            form_data,
            response_data,
            active_step,
        }
    }
}

impl Lookup for DataBag<'_> {
    fn lookup(&self, path: &Path) -> Option<Value> {
        if let Some(step_id) = self.active_step
            && let Some(value) = self.form_data.get(step_id).and_then(|record| record.get(&path.scope))
            && let Some(found) = navigate(value, &path.keys)
        {
            return Some(found.clone());
        }

        if let Some(record) = self.form_data.get(&path.scope) {
            match path.keys.split_first() {
                None => return Some(Value::Object(record.clone())),
                Some((field, rest)) => {
                    if let Some(found) = record.get(field).and_then(|value| navigate(value, rest)) {
                        return Some(found.clone());
                    }
                }
            }
        }

        let root = self.response_data.get(&path.scope)?;
        navigate(root, &path.keys).cloned()
    }
}

/// Walks `keys` through nested objects and arrays (numeric keys index arrays).
pub fn navigate<'v>(root: &'v Value, keys: &[String]) -> Option<&'v Value> {
    let mut current = root;
    for key in keys {
        current = match current {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Formats a JSON value the way form inputs hold it: strings unquoted, null empty.
pub fn format_json_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
