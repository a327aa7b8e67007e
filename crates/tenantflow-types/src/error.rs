use thiserror::Error;

/// Errors from repository operations (used by trait definitions in tenantflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by the workflow engine services.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A version, execution or approval lookup missed.
    #[error("{0} not found")]
    NotFound(String),

    /// The trigger does not exist, is inactive, or belongs to another workflow.
    #[error("trigger '{0}' not found or inactive")]
    NotFoundOrInactive(String),

    /// Malformed input; nothing was written.
    #[error("validation error: {0}")]
    Validation(String),

    /// The execution state machine rejected the requested transition.
    #[error("cannot {action} execution in status '{from}'")]
    InvalidTransition { from: String, action: String },

    /// A concurrent writer won the race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The persistent store failed; the caller may retry.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] RepositoryError),
}

impl From<RepositoryError> for EngineError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(msg) => EngineError::Conflict(msg),
            other => EngineError::StoreUnavailable(other),
        }
    }
}

impl EngineError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StoreUnavailable(_) | EngineError::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::InvalidTransition {
            from: "completed".to_string(),
            action: "cancel".to_string(),
        };
        assert_eq!(err.to_string(), "cannot cancel execution in status 'completed'");

        let err = EngineError::NotFoundOrInactive("t-1".to_string());
        assert!(err.to_string().contains("t-1"));
    }

    #[test]
    fn test_conflict_maps_to_engine_conflict() {
        let err: EngineError = RepositoryError::Conflict("stale revision".to_string()).into();
        assert!(matches!(err, EngineError::Conflict(_)));
        assert!(err.is_retryable());

        let err: EngineError = RepositoryError::Connection.into();
        assert!(matches!(err, EngineError::StoreUnavailable(_)));
        assert!(err.is_retryable());

        assert!(!EngineError::Validation("x".to_string()).is_retryable());
    }
}
