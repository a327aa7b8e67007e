//! SQLite workflow execution repository implementation.
//!
//! Executions are written with an optimistic revision check: an update only
//! lands if the stored revision still matches the one the caller read.

use chrono::{DateTime, Utc};
use sqlx::Row;
use tenantflow_core::repository::execution::ExecutionRepository;
use tenantflow_types::error::RepositoryError;
use tenantflow_types::execution::{ExecutionStatus, PendingApproval, WorkflowExecution};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, query_error, to_json, write_error};

/// SQLite-backed implementation of `ExecutionRepository`.
#[derive(Clone)]
pub struct SqliteExecutionRepository {
    pool: DatabasePool,
}

impl SqliteExecutionRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to `WorkflowExecution`.
struct ExecutionRow {
    id: String,
    workflow_id: String,
    company_id: String,
    version_id: String,
    version_number: i64,
    trigger_id: Option<String>,
    status: String,
    started_by: String,
    started_at: String,
    updated_at: String,
    completed_at: Option<String>,
    variables: String,
    current_step_id: Option<String>,
    steps_completed: String,
    pending_approvals: String,
    error: Option<String>,
    idempotency_key: Option<String>,
    revision: i64,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            company_id: row.try_get("company_id")?,
            version_id: row.try_get("version_id")?,
            version_number: row.try_get("version_number")?,
            trigger_id: row.try_get("trigger_id")?,
            status: row.try_get("status")?,
            started_by: row.try_get("started_by")?,
            started_at: row.try_get("started_at")?,
            updated_at: row.try_get("updated_at")?,
            completed_at: row.try_get("completed_at")?,
            variables: row.try_get("variables")?,
            current_step_id: row.try_get("current_step_id")?,
            steps_completed: row.try_get("steps_completed")?,
            pending_approvals: row.try_get("pending_approvals")?,
            error: row.try_get("error")?,
            idempotency_key: row.try_get("idempotency_key")?,
            revision: row.try_get("revision")?,
        })
    }

    fn into_execution(self) -> Result<WorkflowExecution, RepositoryError> {
        let parse_uuid = |s: &str, what: &str| {
            s.parse::<Uuid>()
                .map_err(|e| RepositoryError::Query(format!("invalid {what}: {e}")))
        };

        Ok(WorkflowExecution {
            id: parse_uuid(&self.id, "execution id")?,
            workflow_id: self.workflow_id,
            company_id: self.company_id,
            version_id: parse_uuid(&self.version_id, "version id")?,
            version_number: self.version_number,
            trigger_id: self
                .trigger_id
                .as_deref()
                .map(|s| parse_uuid(s, "trigger id"))
                .transpose()?,
            status: self
                .status
                .parse::<ExecutionStatus>()
                .map_err(RepositoryError::Query)?,
            started_by: self.started_by,
            started_at: parse_datetime(&self.started_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
            variables: from_json(&self.variables, "variables")?,
            current_step_id: self.current_step_id,
            steps_completed: from_json::<Vec<String>>(&self.steps_completed, "steps_completed")?,
            pending_approvals: from_json::<Vec<PendingApproval>>(
                &self.pending_approvals,
                "pending_approvals",
            )?,
            error: self.error,
            idempotency_key: self.idempotency_key,
            revision: self.revision,
        })
    }
}

fn rows_to_executions(
    rows: &[sqlx::sqlite::SqliteRow],
) -> Result<Vec<WorkflowExecution>, RepositoryError> {
    rows.iter()
        .map(|row| {
            ExecutionRow::from_row(row)
                .map_err(query_error)?
                .into_execution()
        })
        .collect()
}

impl ExecutionRepository for SqliteExecutionRepository {
    async fn start_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        let variables = to_json(&execution.variables)?;
        let steps_completed = to_json(&execution.steps_completed)?;
        let pending_approvals = to_json(&execution.pending_approvals)?;

        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        sqlx::query(
            "INSERT INTO workflow_executions (id, workflow_id, company_id, version_id, version_number, trigger_id, status, started_by, started_at, updated_at, completed_at, variables, current_step_id, steps_completed, pending_approvals, error, idempotency_key, revision)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(execution.id.to_string())
        .bind(&execution.workflow_id)
        .bind(&execution.company_id)
        .bind(execution.version_id.to_string())
        .bind(execution.version_number)
        .bind(execution.trigger_id.map(|id| id.to_string()))
        .bind(execution.status.to_string())
        .bind(&execution.started_by)
        .bind(format_datetime(&execution.started_at))
        .bind(format_datetime(&execution.updated_at))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .bind(&variables)
        .bind(&execution.current_step_id)
        .bind(&steps_completed)
        .bind(&pending_approvals)
        .bind(&execution.error)
        .bind(&execution.idempotency_key)
        .bind(execution.revision)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            write_error(e, || match &execution.idempotency_key {
                Some(key) => format!("an execution already exists for event {key}"),
                None => format!("execution {} already exists", execution.id),
            })
        })?;

        let result = sqlx::query(
            "UPDATE workflow_versions SET total_executions = total_executions + 1 WHERE id = ?",
        )
        .bind(execution.version_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;
        if result.rows_affected() != 1 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(
                ExecutionRow::from_row(&row)
                    .map_err(query_error)?
                    .into_execution()?,
            )),
            None => Ok(None),
        }
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE idempotency_key = ?")
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(
                ExecutionRow::from_row(&row)
                    .map_err(query_error)?
                    .into_execution()?,
            )),
            None => Ok(None),
        }
    }

    async fn update_execution(
        &self,
        execution: &WorkflowExecution,
        expected_revision: i64,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE workflow_executions
             SET status = ?, updated_at = ?, completed_at = ?, variables = ?, current_step_id = ?,
                 steps_completed = ?, pending_approvals = ?, error = ?, revision = ?
             WHERE id = ? AND revision = ?",
        )
        .bind(execution.status.to_string())
        .bind(format_datetime(&execution.updated_at))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .bind(to_json(&execution.variables)?)
        .bind(&execution.current_step_id)
        .bind(to_json(&execution.steps_completed)?)
        .bind(to_json(&execution.pending_approvals)?)
        .bind(&execution.error)
        .bind(execution.revision)
        .bind(execution.id.to_string())
        .bind(expected_revision)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "execution {} changed since revision {expected_revision}",
                execution.id
            )));
        }
        Ok(())
    }

    async fn list_stale(
        &self,
        idle_since: DateTime<Utc>,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_executions
             WHERE status IN ('running', 'awaiting_approval') AND updated_at < ?
             ORDER BY updated_at ASC",
        )
        .bind(format_datetime(&idle_since))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows_to_executions(&rows)
    }

    async fn list_executions(
        &self,
        workflow_id: &str,
        limit: i64,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_executions WHERE workflow_id = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows_to_executions(&rows)
    }
}
