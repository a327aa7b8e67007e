//! Workflow version repository trait definition.

use tenantflow_types::error::RepositoryError;
use tenantflow_types::workflow::WorkflowVersion;
use uuid::Uuid;

/// Repository trait for immutable workflow version snapshots.
pub trait VersionRepository: Send + Sync {
    /// Insert `version` and, in the same transaction, deactivate `supersedes`.
    ///
    /// Must fail with `RepositoryError::Conflict` (writing nothing) when
    /// `supersedes` is no longer active, the version number is taken, or the
    /// insert would leave two active versions for the workflow.
    fn commit_version(
        &self,
        version: &WorkflowVersion,
        supersedes: Option<Uuid>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Mark an existing inactive version active and, in the same transaction,
    /// deactivate `supersedes`. Same conflict rules as `commit_version`.
    fn activate_version(
        &self,
        version_id: &Uuid,
        supersedes: Option<Uuid>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a version by its UUID.
    fn get_version(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowVersion>, RepositoryError>> + Send;

    /// All versions of a workflow, ordered by `version_number` ascending.
    fn list_versions(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowVersion>, RepositoryError>> + Send;

    /// The active version of a workflow, if any.
    fn get_active_version(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowVersion>, RepositoryError>> + Send;
}
