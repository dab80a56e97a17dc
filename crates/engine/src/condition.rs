//! Declarative predicate evaluation.
//!
//! Conditions gate field visibility, action execution and grid capabilities.
//! Evaluation is pure and cheap enough to run on every render.

use serde_json::Value;
use toolkit_types::{ActionCondition, Condition, ConditionOperator};

use crate::path::{Lookup, Path, format_json_value};

/// Evaluates an optional condition; an absent condition is open.
///
/// A value that cannot be found never equals anything, so only `notEquals`
/// and `notExists` hold for it.
pub fn evaluate(condition: Option<&Condition>, data: &impl Lookup) -> bool {
    let Some(condition) = condition else {
        return true;
    };
    let actual = condition.key.parse::<Path>().ok().and_then(|path| data.lookup(&path));
    let expected = condition.value.as_ref();

    match condition.operator {
        ConditionOperator::Equals => matches_equals(actual.as_ref(), expected),
        ConditionOperator::NotEquals => !matches_equals(actual.as_ref(), expected),
        ConditionOperator::Contains => match (actual.as_ref(), expected) {
            (Some(Value::Array(items)), Some(needle)) => items.iter().any(|item| loose_eq(item, needle)),
            (Some(Value::String(haystack)), Some(needle)) => haystack.contains(&format_json_value(needle)),
            _ => false,
        },
        ConditionOperator::IsLessThan => compare_numbers(actual.as_ref(), expected).is_some_and(|(left, right)| left < right),
        ConditionOperator::IsGreaterThan => {
            compare_numbers(actual.as_ref(), expected).is_some_and(|(left, right)| left > right)
        }
        ConditionOperator::Exists => is_present(actual.as_ref()),
        ConditionOperator::NotExists => !is_present(actual.as_ref()),
        ConditionOperator::Unsupported => false,
    }
}

/// Evaluates the `{when, equals}` gate used by actions and grid capabilities.
pub fn evaluate_gate(gate: Option<&ActionCondition>, data: &impl Lookup) -> bool {
    match gate {
        None => true,
        Some(gate) => evaluate(Some(&Condition::from(gate)), data),
    }
}

/// Equality with string coercion, so `"3"` from a text input equals `3`.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().is_some() && a.as_f64() == b.as_f64(),
        (Value::String(_), _) | (_, Value::String(_)) => format_json_value(left) == format_json_value(right),
        _ => false,
    }
}

fn matches_equals(actual: Option<&Value>, expected: Option<&Value>) -> bool {
    match (actual, expected) {
        (None, _) => false,
        (Some(actual), Some(expected)) => loose_eq(actual, expected),
        (Some(actual), None) => actual.is_null(),
    }
}

fn is_present(value: Option<&Value>) -> bool {
    value.is_some_and(|value| !value.is_null())
}

fn compare_numbers(actual: Option<&Value>, expected: Option<&Value>) -> Option<(f64, f64)> {
    Some((as_number(actual?)?, as_number(expected?)?))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn condition(key: &str, operator: ConditionOperator, value: Option<Value>) -> Condition {
        Condition {
            key: key.into(),
            operator,
            value,
        }
    }

    #[test]
    fn absent_condition_is_open() {
        assert!(evaluate(None, &json!({})));
    }

    #[test]
    fn equals_coerces_strings() {
        let data = json!({ "count": 3, "flag": true, "name": "x" });
        assert!(evaluate(Some(&condition("count", ConditionOperator::Equals, Some(json!("3")))), &data));
        assert!(evaluate(Some(&condition("flag", ConditionOperator::Equals, Some(json!("true")))), &data));
        assert!(!evaluate(Some(&condition("name", ConditionOperator::Equals, Some(json!("y")))), &data));
    }

    #[test]
    fn missing_never_equals() {
        let data = json!({});
        assert!(!evaluate(Some(&condition("a.b", ConditionOperator::Equals, None)), &data));
        assert!(!evaluate(Some(&condition("a", ConditionOperator::Equals, Some(Value::Null))), &data));
        assert!(evaluate(Some(&condition("a", ConditionOperator::NotEquals, Some(json!("x")))), &data));
        assert!(evaluate(Some(&condition("a", ConditionOperator::NotExists, None)), &data));
        assert!(!evaluate(Some(&condition("a", ConditionOperator::Exists, None)), &data));
    }

    #[test]
    fn null_counts_as_not_existing() {
        let data = json!({ "a": null });
        assert!(!evaluate(Some(&condition("a", ConditionOperator::Exists, None)), &data));
        assert!(evaluate(Some(&condition("a", ConditionOperator::NotExists, None)), &data));
    }

    #[test]
    fn contains_and_numeric_comparisons() {
        let data = json!({ "tags": ["a", "b"], "title": "quarterly report", "size": "12" });
        assert!(evaluate(Some(&condition("tags", ConditionOperator::Contains, Some(json!("b")))), &data));
        assert!(evaluate(Some(&condition("title", ConditionOperator::Contains, Some(json!("report")))), &data));
        assert!(evaluate(Some(&condition("size", ConditionOperator::IsGreaterThan, Some(json!(10)))), &data));
        assert!(!evaluate(Some(&condition("size", ConditionOperator::IsLessThan, Some(json!(10)))), &data));
        assert!(!evaluate(Some(&condition("title", ConditionOperator::IsLessThan, Some(json!(10)))), &data));
    }

    #[test]
    fn unsupported_operator_is_false() {
        let data = json!({ "a": 1 });
        assert!(!evaluate(Some(&condition("a", ConditionOperator::Unsupported, Some(json!(1)))), &data));
    }

    #[test]
    fn gate_applies_equals() {
        let data = json!({ "mode": "advanced" });
        let gate = ActionCondition {
            when: "mode".into(),
            equals: json!("advanced"),
        };
        assert!(evaluate_gate(Some(&gate), &data));
        assert!(evaluate_gate(None, &data));
    }
}
