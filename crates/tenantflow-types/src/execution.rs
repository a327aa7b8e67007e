//! Workflow execution types.
//!
//! A `WorkflowExecution` is one run of one workflow version. Its lifecycle is:
//! running -> (awaiting_approval <-> running)* -> completed | failed | cancelled.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    /// Blocked on one or more pending approvals.
    AwaitingApproval,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Completed, failed and cancelled executions accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::AwaitingApproval => write!(f, "awaiting_approval"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(ExecutionStatus::Running),
            "awaiting_approval" => Ok(ExecutionStatus::AwaitingApproval),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            other => Err(format!("invalid execution status: '{other}'")),
        }
    }
}

/// A manual gate an execution is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub id: Uuid,
    /// The approval step that raised this gate.
    pub step_id: String,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// One run of one workflow version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: String,
    pub company_id: String,
    pub version_id: Uuid,
    pub version_number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<Uuid>,
    pub status: ExecutionStatus,
    /// "system" for trigger-started runs, otherwise the user's email.
    pub started_by: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Seeded from the trigger payload, extended by step outputs.
    pub variables: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
    #[serde(default)]
    pub steps_completed: Vec<String>,
    #[serde(default)]
    pub pending_approvals: Vec<PendingApproval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Optimistic concurrency counter, bumped on every stored update.
    pub revision: i64,
}

/// Outcome of a manual approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

impl fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalDecision::Approve => write!(f, "approve"),
            ApprovalDecision::Reject => write!(f, "reject"),
        }
    }
}

/// An inbound event addressed to a trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub workflow_id: String,
    pub trigger_id: Uuid,
    pub company_id: String,
    /// Event fields the trigger conditions are evaluated against.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Result of handling a trigger event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerOutcome {
    pub executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TriggerOutcome {
    pub fn executed(execution_id: Uuid) -> Self {
        Self {
            executed: true,
            execution_id: Some(execution_id),
            reason: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            executed: false,
            execution_id: None,
            reason: Some(reason.into()),
        }
    }
}
