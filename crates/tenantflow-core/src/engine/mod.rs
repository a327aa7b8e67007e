//! Pure decision logic: condition evaluation and first-match rule resolution.
//!
//! - `condition` -- `(field, operator, value)` predicates over nested JSON
//! - `rules` -- ordered rule lists resolved to a next step

pub mod condition;
pub mod rules;

pub use condition::{ConditionEvaluator, EvaluationError, StandardEvaluator};
pub use rules::{Resolution, RuleEngine};
