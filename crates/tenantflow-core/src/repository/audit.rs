//! Audit logger port.

use tenantflow_types::audit::AuditEntry;
use tenantflow_types::error::RepositoryError;

/// Append-only sink for audit entries.
///
/// The engine only writes; reading the log is an operator concern.
pub trait AuditLogger: Send + Sync {
    fn append(
        &self,
        entry: &AuditEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
