//! Condition evaluator.
//!
//! Evaluates a single `Condition` against a nested JSON context. Evaluation is
//! pure and total: a missing field, an incomparable operand or a malformed
//! regex all evaluate to `false`, never to an error the caller must handle.
//!
//! Loose comparisons follow the coercion rules of the event producers (which
//! send JSON straight from web forms and webhooks): `contains` compares string
//! forms, ordering operators compare numeric forms.

use regex::Regex;
use serde_json::Value;

use tenantflow_types::condition::{Condition, ConditionValue, Operator};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised inside evaluation. Never escapes `ConditionEvaluator::evaluate`.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("invalid regex pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

// ---------------------------------------------------------------------------
// Evaluator trait
// ---------------------------------------------------------------------------

/// Decides whether a condition holds for a context.
///
/// Implementations must be deterministic and side-effect free.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, condition: &Condition, context: &Value) -> bool;
}

/// The built-in evaluator covering every `Operator`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardEvaluator;

impl StandardEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate, surfacing regex compilation failures.
    pub fn try_evaluate(
        &self,
        condition: &Condition,
        context: &Value,
    ) -> Result<bool, EvaluationError> {
        let resolved = resolve_path(context, &condition.field);
        let expected = &condition.value;

        let result = match condition.operator {
            Operator::Equals => loose_equals(resolved, expected),
            Operator::NotEquals => !loose_equals(resolved, expected),
            Operator::Contains => js_string(resolved).contains(&literal_string(expected)),
            Operator::NotContains => !js_string(resolved).contains(&literal_string(expected)),
            Operator::GreaterThan => js_number(resolved) > literal_number(expected),
            Operator::LessThan => js_number(resolved) < literal_number(expected),
            Operator::GreaterOrEqual => js_number(resolved) >= literal_number(expected),
            Operator::LessOrEqual => js_number(resolved) <= literal_number(expected),
            Operator::IsEmpty => !truthy(resolved),
            Operator::IsNotEmpty => truthy(resolved),
            Operator::MatchesRegex => {
                let pattern = literal_string(expected);
                let re = Regex::new(&pattern).map_err(|e| EvaluationError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
                re.is_match(&js_string(resolved))
            }
            Operator::Unknown => {
                tracing::debug!(field = %condition.field, "unknown operator, condition is false");
                false
            }
        };
        Ok(result)
    }
}

impl ConditionEvaluator for StandardEvaluator {
    fn evaluate(&self, condition: &Condition, context: &Value) -> bool {
        match self.try_evaluate(condition, context) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(field = %condition.field, error = %e, "condition evaluation failed");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Field resolution
// ---------------------------------------------------------------------------

/// Walk a dot-separated path through objects (and arrays by index).
///
/// Returns `None` ("absent") as soon as a segment is missing or the current
/// value cannot be descended into.
pub fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

// ---------------------------------------------------------------------------
// Equality
// ---------------------------------------------------------------------------

fn loose_equals(resolved: Option<&Value>, expected: &ConditionValue) -> bool {
    let Some(actual) = resolved else {
        return false;
    };

    let strict = match (expected, actual) {
        (ConditionValue::Null, Value::Null) => true,
        (ConditionValue::Bool(a), Value::Bool(b)) => a == b,
        (ConditionValue::Number(a), Value::Number(b)) => b.as_f64().is_some_and(|b| *a == b),
        (ConditionValue::String(a), Value::String(b)) => a == b,
        _ => false,
    };
    if strict {
        return true;
    }

    // String literals may carry a JSON-encoded value ("\"open\"", "100", "true").
    match expected {
        ConditionValue::String(encoded) => serde_json::from_str::<Value>(encoded)
            .ok()
            .is_some_and(|parsed| json_equals(&parsed, actual)),
        _ => false,
    }
}

/// Structural equality with numbers compared by value (`1` equals `1.0`).
fn json_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equals(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| json_equals(x, y)))
        }
        _ => a == b,
    }
}

// ---------------------------------------------------------------------------
// Coercions
// ---------------------------------------------------------------------------

/// String form of a resolved value (`None` renders as `"undefined"`).
pub fn js_string(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(v) => value_string(v),
    }
}

fn value_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_string(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => value_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn number_string(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    n.as_f64().map(format_f64).unwrap_or_else(|| "NaN".to_string())
}

fn format_f64(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        let s = if f > 0.0 { "Infinity" } else { "-Infinity" };
        s.to_string()
    } else if f == 0.0 {
        "0".to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e21 {
        format!("{f:.0}")
    } else {
        format!("{f}")
    }
}

/// Numeric form of a resolved value. Absent and unparseable values are NaN.
pub fn js_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_number(s),
        Some(v @ Value::Array(_)) => parse_number(&value_string(v)),
        Some(Value::Object(_)) => f64::NAN,
    }
}

fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = t.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN);
        }
    }
    // Rust also accepts "inf" and "nan" spellings; only exponents are letters here.
    if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// Falsy: absent, null, false, 0, NaN and "".
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn literal_string(value: &ConditionValue) -> String {
    match value {
        ConditionValue::Null => "null".to_string(),
        ConditionValue::Bool(b) => b.to_string(),
        ConditionValue::Number(n) => format_f64(*n),
        ConditionValue::String(s) => s.clone(),
    }
}

fn literal_number(value: &ConditionValue) -> f64 {
    match value {
        ConditionValue::Null => 0.0,
        ConditionValue::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        ConditionValue::Number(n) => *n,
        ConditionValue::String(s) => parse_number(s),
    }
}
