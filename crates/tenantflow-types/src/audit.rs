//! Audit log entry types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of change an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    WorkflowTriggered,
    WorkflowVersionCreated,
    WorkflowVersionDeactivated,
    WorkflowVersionActivated,
    TriggerCreated,
    TriggerDeactivated,
    ExecutionStepCompleted,
    ExecutionCompleted,
    ExecutionFailed,
    ExecutionCancelled,
    ApprovalResolved,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::WorkflowTriggered => "workflow_triggered",
            AuditAction::WorkflowVersionCreated => "workflow_version_created",
            AuditAction::WorkflowVersionDeactivated => "workflow_version_deactivated",
            AuditAction::WorkflowVersionActivated => "workflow_version_activated",
            AuditAction::TriggerCreated => "trigger_created",
            AuditAction::TriggerDeactivated => "trigger_deactivated",
            AuditAction::ExecutionStepCompleted => "execution_step_completed",
            AuditAction::ExecutionCompleted => "execution_completed",
            AuditAction::ExecutionFailed => "execution_failed",
            AuditAction::ExecutionCancelled => "execution_cancelled",
            AuditAction::ApprovalResolved => "approval_resolved",
        }
    }

    /// The entity type the action is recorded against.
    pub fn entity_type(&self) -> &'static str {
        match self {
            AuditAction::WorkflowTriggered
            | AuditAction::ExecutionStepCompleted
            | AuditAction::ExecutionCompleted
            | AuditAction::ExecutionFailed
            | AuditAction::ExecutionCancelled
            | AuditAction::ApprovalResolved => "workflow_execution",
            AuditAction::WorkflowVersionCreated
            | AuditAction::WorkflowVersionDeactivated
            | AuditAction::WorkflowVersionActivated => "workflow_version",
            AuditAction::TriggerCreated | AuditAction::TriggerDeactivated => "workflow_trigger",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s {
            "workflow_triggered" => AuditAction::WorkflowTriggered,
            "workflow_version_created" => AuditAction::WorkflowVersionCreated,
            "workflow_version_deactivated" => AuditAction::WorkflowVersionDeactivated,
            "workflow_version_activated" => AuditAction::WorkflowVersionActivated,
            "trigger_created" => AuditAction::TriggerCreated,
            "trigger_deactivated" => AuditAction::TriggerDeactivated,
            "execution_step_completed" => AuditAction::ExecutionStepCompleted,
            "execution_completed" => AuditAction::ExecutionCompleted,
            "execution_failed" => AuditAction::ExecutionFailed,
            "execution_cancelled" => AuditAction::ExecutionCancelled,
            "approval_resolved" => AuditAction::ApprovalResolved,
            other => return Err(format!("invalid audit action: '{other}'")),
        };
        Ok(action)
    }
}

/// A single audit log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action_type: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    /// Acting user, or "system" for engine-initiated changes.
    pub user_email: String,
    pub company_id: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Start an entry for `action` on `entity_id`. Entity type is derived
    /// from the action; metadata starts as an empty object.
    pub fn new(
        action: AuditAction,
        entity_id: impl Into<String>,
        company_id: impl Into<String>,
        user_email: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            action_type: action,
            entity_type: action.entity_type().to_string(),
            entity_id: entity_id.into(),
            user_email: user_email.into(),
            company_id: company_id.into(),
            description: description.into(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
