//! Workflow definition types: versions, steps and triggers.
//!
//! A `WorkflowVersion` is an immutable snapshot of a workflow's definition.
//! Versions sharing a `workflow_id` form the history of one logical workflow,
//! of which at most one is active at any time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::condition::{Condition, ConditionLogic};

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// The kind of step in a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Side-effecting work performed by a step handler (email, PDF, LLM...).
    #[default]
    Action,
    /// Pure branching node resolved by the rule engine.
    Condition,
    /// Manual gate that blocks the execution until resolved.
    Approval,
}

/// A single step of a workflow version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique within a version (e.g. "send-reminder").
    pub id: String,
    /// Human-readable step name.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: StepKind,
    /// Static successor. `None` marks a terminal step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<String>,
    /// Branching rules (required for `condition` steps).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<ConditionLogic>,
    /// Step-specific configuration, opaque to the engine.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

impl StepDefinition {
    /// Step ids this step may hand control to.
    pub fn successors(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.next_step_id.as_deref().into_iter().collect();
        if let Some(logic) = &self.logic {
            out.extend(logic.targets());
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// What kind of inbound event a trigger listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Webhook,
    Schedule,
    EntityChange,
    Manual,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerType::Webhook => write!(f, "webhook"),
            TriggerType::Schedule => write!(f, "schedule"),
            TriggerType::EntityChange => write!(f, "entity_change"),
            TriggerType::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "webhook" => Ok(TriggerType::Webhook),
            "schedule" => Ok(TriggerType::Schedule),
            "entity_change" => Ok(TriggerType::EntityChange),
            "manual" => Ok(TriggerType::Manual),
            other => Err(format!("invalid trigger type: '{other}'")),
        }
    }
}

/// Trigger description embedded in a workflow version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub trigger_type: TriggerType,
    pub trigger_name: String,
    /// All conditions must match for the trigger to fire.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A stored trigger: the gate that decides whether an event starts a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub id: Uuid,
    pub workflow_id: String,
    pub company_id: String,
    pub trigger_type: TriggerType,
    pub trigger_name: String,
    pub is_active: bool,
    /// Logical AND: every condition must hold.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub created_at: DateTime<Utc>,
}

/// Request to create a trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTriggerRequest {
    pub workflow_id: String,
    pub company_id: String,
    pub trigger_type: TriggerType,
    pub trigger_name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

/// Immutable snapshot of a workflow definition.
///
/// Only `is_active` and `total_executions` change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub id: Uuid,
    /// Groups the versions of one logical workflow.
    pub workflow_id: String,
    /// Owning tenant.
    pub company_id: String,
    /// 1-based, monotonically increasing per `workflow_id`.
    pub version_number: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerSpec>,
    /// Ordered steps; the first one is the entry step.
    pub steps: Vec<StepDefinition>,
    pub is_active: bool,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_notes: Option<String>,
    pub total_executions: i64,
    pub created_at: DateTime<Utc>,
}

impl WorkflowVersion {
    /// The step an execution starts at.
    pub fn entry_step(&self) -> Option<&StepDefinition> {
        self.steps.first()
    }

    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// Request to publish a new workflow version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub workflow_id: String,
    pub company_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub trigger: Option<TriggerSpec>,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub change_notes: Option<String>,
    #[serde(default)]
    pub activate: bool,
    /// Email of the authenticated publisher; filled in by the entry point.
    #[serde(default)]
    pub created_by: String,
}
