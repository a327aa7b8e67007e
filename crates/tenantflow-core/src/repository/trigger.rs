//! Workflow trigger repository trait definition.

use tenantflow_types::error::RepositoryError;
use tenantflow_types::workflow::WorkflowTrigger;
use uuid::Uuid;

/// Repository trait for trigger persistence.
pub trait TriggerRepository: Send + Sync {
    /// Create a new trigger record.
    fn create_trigger(
        &self,
        trigger: &WorkflowTrigger,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a trigger by its UUID.
    fn get_trigger(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowTrigger>, RepositoryError>> + Send;

    /// List the triggers of a workflow, oldest first.
    fn list_triggers(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowTrigger>, RepositoryError>> + Send;

    /// Flip a trigger's `is_active` flag. Returns `false` if it does not exist.
    fn set_trigger_active(
        &self,
        id: &Uuid,
        is_active: bool,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
