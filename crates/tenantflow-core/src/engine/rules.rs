//! First-match rule resolution.
//!
//! Rules are tried in order; the first whose condition holds decides the next
//! step and action. Later rules are never evaluated. When nothing matches the
//! logic's default step is used with no action.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tenantflow_types::condition::{ConditionLogic, Rule};

use super::condition::ConditionEvaluator;

/// Outcome of resolving a `ConditionLogic`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Index of the winning rule, `None` when the default applied.
    pub matched_rule: Option<usize>,
    pub next_step_id: Option<String>,
    pub action: Option<String>,
}

/// Resolves branching logic with a pluggable condition evaluator.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine<E: ConditionEvaluator> {
    evaluator: E,
}

impl<E: ConditionEvaluator> RuleEngine<E> {
    pub fn new(evaluator: E) -> Self {
        Self { evaluator }
    }

    /// The evaluator used for individual conditions.
    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn resolve(&self, logic: &ConditionLogic, context: &Value) -> Resolution {
        self.first_match(
            logic.rules.iter().enumerate(),
            logic.default_next_step_id.as_deref(),
            context,
        )
    }

    /// Resolve untyped logic as stored on legacy step records.
    ///
    /// Malformed rule entries are skipped; `matched_rule` still indexes the
    /// original `rules` array.
    pub fn resolve_value(&self, logic: &Value, context: &Value) -> Resolution {
        let rules = ConditionLogic::rules_from_value(logic);
        let default = logic.get("default_next_step_id").and_then(Value::as_str);
        self.first_match(rules.iter().map(|(index, rule)| (*index, rule)), default, context)
    }

    fn first_match<'r>(
        &self,
        rules: impl IntoIterator<Item = (usize, &'r Rule)>,
        default_next_step_id: Option<&str>,
        context: &Value,
    ) -> Resolution {
        for (index, rule) in rules {
            if self.evaluator.evaluate(&rule.condition, context) {
                tracing::debug!(
                    rule = index,
                    next_step_id = ?rule.next_step_id,
                    "rule matched"
                );
                return Resolution {
                    matched_rule: Some(index),
                    next_step_id: rule.next_step_id.clone(),
                    action: rule.action.clone(),
                };
            }
        }

        Resolution {
            matched_rule: None,
            next_step_id: default_next_step_id.map(str::to_string),
            action: None,
        }
    }
}
