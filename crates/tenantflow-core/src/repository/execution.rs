//! Workflow execution repository trait definition.

use chrono::{DateTime, Utc};
use tenantflow_types::error::RepositoryError;
use tenantflow_types::execution::WorkflowExecution;
use uuid::Uuid;

/// Repository trait for execution persistence.
///
/// Updates are optimistic: every write names the revision it was derived
/// from, and a mismatch is a `RepositoryError::Conflict`.
pub trait ExecutionRepository: Send + Sync {
    /// Insert a new execution and increment `total_executions` on its
    /// version in the same transaction.
    ///
    /// A duplicate `idempotency_key` is a `RepositoryError::Conflict`.
    fn start_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an execution by its UUID.
    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowExecution>, RepositoryError>> + Send;

    /// Find the execution started by a given trigger event.
    fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowExecution>, RepositoryError>> + Send;

    /// Replace the stored execution if its revision is still
    /// `expected_revision`. `execution.revision` is the new revision.
    fn update_execution(
        &self,
        execution: &WorkflowExecution,
        expected_revision: i64,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Non-terminal executions not updated since `idle_since`.
    fn list_stale(
        &self,
        idle_since: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;

    /// Most recent executions of a workflow, newest first.
    fn list_executions(
        &self,
        workflow_id: &str,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;
}
