//! Condition, rule and branching-logic types.
//!
//! A `Condition` is a single `(field, operator, value)` predicate. Conditions
//! gate triggers (all must hold) and drive step branching through an ordered
//! list of `Rule`s (first match wins).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// Comparison operator of a condition.
///
/// Unrecognized operator strings deserialize to `Unknown`, which never matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    IsEmpty,
    IsNotEmpty,
    MatchesRegex,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::GreaterThan => "greater_than",
            Operator::LessThan => "less_than",
            Operator::GreaterOrEqual => "greater_or_equal",
            Operator::LessOrEqual => "less_or_equal",
            Operator::IsEmpty => "is_empty",
            Operator::IsNotEmpty => "is_not_empty",
            Operator::MatchesRegex => "matches_regex",
            Operator::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ConditionValue
// ---------------------------------------------------------------------------

/// Literal operand of a condition, typed when the rule is authored.
///
/// Objects and arrays are rejected at deserialization time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum ConditionValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl ConditionValue {
    /// The literal as a JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            ConditionValue::Null => Value::Null,
            ConditionValue::Bool(b) => Value::Bool(*b),
            ConditionValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ConditionValue::String(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(s: &str) -> Self {
        ConditionValue::String(s.to_string())
    }
}

impl From<f64> for ConditionValue {
    fn from(n: f64) -> Self {
        ConditionValue::Number(n)
    }
}

impl From<bool> for ConditionValue {
    fn from(b: bool) -> Self {
        ConditionValue::Bool(b)
    }
}

// ---------------------------------------------------------------------------
// Condition / Rule / ConditionLogic
// ---------------------------------------------------------------------------

/// A single predicate evaluated against a nested JSON context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dot-separated path into the context (e.g. `"customer.address.country"`).
    pub field: String,
    pub operator: Operator,
    /// Omitted for unary operators (`is_empty`, `is_not_empty`).
    #[serde(default)]
    pub value: ConditionValue,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<ConditionValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

/// A condition paired with the step it routes to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub condition: Condition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<String>,
    /// Optional action label handed back to the caller on match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// Ordered branching rules of a condition step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionLogic {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_next_step_id: Option<String>,
}

impl ConditionLogic {
    /// Lenient conversion from an untyped JSON blob.
    ///
    /// A missing or non-array `rules` yields zero rules, and rule entries that
    /// do not parse are skipped. Never fails.
    pub fn from_value(value: &Value) -> Self {
        let rules = Self::rules_from_value(value)
            .into_iter()
            .map(|(_, rule)| rule)
            .collect();

        let default_next_step_id = value
            .get("default_next_step_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            rules,
            default_next_step_id,
        }
    }

    /// The parseable rule entries of an untyped blob, each paired with its
    /// position in the original `rules` array.
    pub fn rules_from_value(value: &Value) -> Vec<(usize, Rule)> {
        value
            .get("rules")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(index, item)| {
                        serde_json::from_value::<Rule>(item.clone())
                            .ok()
                            .map(|rule| (index, rule))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every step id this logic can route to.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter_map(|r| r.next_step_id.as_deref())
            .chain(self.default_next_step_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_serde_and_unknown_fallback() {
        let op: Operator = serde_json::from_value(json!("greater_or_equal")).unwrap();
        assert_eq!(op, Operator::GreaterOrEqual);
        assert_eq!(op.to_string(), "greater_or_equal");

        let op: Operator = serde_json::from_value(json!("starts_with")).unwrap();
        assert_eq!(op, Operator::Unknown);
    }

    #[test]
    fn test_condition_value_is_typed_at_parse_time() {
        let c: Condition =
            serde_json::from_value(json!({"field": "amount", "operator": "greater_than", "value": 100}))
                .unwrap();
        assert_eq!(c.value, ConditionValue::Number(100.0));

        let c: Condition =
            serde_json::from_value(json!({"field": "status", "operator": "equals", "value": "\"open\""}))
                .unwrap();
        assert_eq!(c.value, ConditionValue::String("\"open\"".to_string()));

        let c: Condition =
            serde_json::from_value(json!({"field": "note", "operator": "is_empty"})).unwrap();
        assert_eq!(c.value, ConditionValue::Null);
    }

    #[test]
    fn test_condition_value_rejects_objects() {
        let parsed = serde_json::from_value::<Condition>(
            json!({"field": "x", "operator": "equals", "value": {"nested": true}}),
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_logic_from_value_tolerates_garbage() {
        assert!(ConditionLogic::from_value(&json!(null)).rules.is_empty());
        assert!(ConditionLogic::from_value(&json!({"rules": "nope"})).rules.is_empty());

        let logic = ConditionLogic::from_value(&json!({
            "rules": [
                {"condition": {"field": "a", "operator": "equals", "value": 1}, "next_step_id": "A"},
                {"garbage": true},
                {"condition": {"field": "b", "operator": "is_empty"}, "next_step_id": "B", "action": "notify"}
            ],
            "default_next_step_id": "C"
        }));
        assert_eq!(logic.rules.len(), 2);
        assert_eq!(logic.rules[1].action.as_deref(), Some("notify"));
        assert_eq!(logic.default_next_step_id.as_deref(), Some("C"));
        assert_eq!(logic.targets().collect::<Vec<_>>(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_logic_yaml_parse() {
        let yaml = r#"
rules:
  - condition:
      field: invoice.total
      operator: greater_than
      value: 1000
    next_step_id: manager-approval
default_next_step_id: auto-approve
"#;
        let logic: ConditionLogic = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(logic.rules[0].condition.field, "invoice.total");
        assert_eq!(logic.rules[0].condition.value, ConditionValue::Number(1000.0));
    }
}
