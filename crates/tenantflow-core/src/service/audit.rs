//! Best-effort audit recording.

use serde_json::json;

use tenantflow_types::audit::{AuditAction, AuditEntry};
use tenantflow_types::execution::{ExecutionStatus, WorkflowExecution};

use crate::repository::audit::AuditLogger;

/// Append an audit entry, logging (not propagating) failures.
///
/// The primary operation has already been committed when this runs.
pub async fn record<A: AuditLogger>(audit: &A, entry: AuditEntry) {
    if let Err(e) = audit.append(&entry).await {
        tracing::warn!(
            action = %entry.action_type,
            entity_id = %entry.entity_id,
            error = %e,
            "failed to write audit entry"
        );
    }
}

/// Record the terminal outcome of an execution. Non-terminal states are skipped.
pub async fn record_outcome<A: AuditLogger>(audit: &A, execution: &WorkflowExecution, actor: &str) {
    let (action, description) = match execution.status {
        ExecutionStatus::Completed => (AuditAction::ExecutionCompleted, "Execution completed"),
        ExecutionStatus::Failed => (AuditAction::ExecutionFailed, "Execution failed"),
        ExecutionStatus::Cancelled => (AuditAction::ExecutionCancelled, "Execution cancelled"),
        ExecutionStatus::Running | ExecutionStatus::AwaitingApproval => return,
    };
    record(
        audit,
        AuditEntry::new(
            action,
            execution.id.to_string(),
            &execution.company_id,
            actor,
            description,
        )
        .with_metadata(json!({
            "workflow_id": execution.workflow_id,
            "version_number": execution.version_number,
            "steps_completed": execution.steps_completed,
            "error": execution.error,
        })),
    )
    .await;
}
