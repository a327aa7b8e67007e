//! SQLite workflow trigger repository implementation.

use sqlx::Row;
use tenantflow_core::repository::trigger::TriggerRepository;
use tenantflow_types::condition::Condition;
use tenantflow_types::error::RepositoryError;
use tenantflow_types::workflow::{TriggerType, WorkflowTrigger};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, query_error, to_json, write_error};

/// SQLite-backed implementation of `TriggerRepository`.
#[derive(Clone)]
pub struct SqliteTriggerRepository {
    pool: DatabasePool,
}

impl SqliteTriggerRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn row_to_trigger(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowTrigger, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_error)?;
    let trigger_type: String = row.try_get("trigger_type").map_err(query_error)?;
    let conditions: String = row.try_get("conditions").map_err(query_error)?;
    let created_at: String = row.try_get("created_at").map_err(query_error)?;

    Ok(WorkflowTrigger {
        id: id
            .parse::<Uuid>()
            .map_err(|e| RepositoryError::Query(format!("invalid trigger id: {e}")))?,
        workflow_id: row.try_get("workflow_id").map_err(query_error)?,
        company_id: row.try_get("company_id").map_err(query_error)?,
        trigger_type: trigger_type
            .parse::<TriggerType>()
            .map_err(RepositoryError::Query)?,
        trigger_name: row.try_get("trigger_name").map_err(query_error)?,
        is_active: row.try_get("is_active").map_err(query_error)?,
        conditions: from_json::<Vec<Condition>>(&conditions, "conditions")?,
        created_at: parse_datetime(&created_at)?,
    })
}

impl TriggerRepository for SqliteTriggerRepository {
    async fn create_trigger(&self, trigger: &WorkflowTrigger) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO workflow_triggers (id, workflow_id, company_id, trigger_type, trigger_name, is_active, conditions, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(trigger.id.to_string())
        .bind(&trigger.workflow_id)
        .bind(&trigger.company_id)
        .bind(trigger.trigger_type.to_string())
        .bind(&trigger.trigger_name)
        .bind(trigger.is_active)
        .bind(to_json(&trigger.conditions)?)
        .bind(format_datetime(&trigger.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| write_error(e, || format!("trigger {} already exists", trigger.id)))?;

        Ok(())
    }

    async fn get_trigger(&self, id: &Uuid) -> Result<Option<WorkflowTrigger>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_triggers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.as_ref().map(row_to_trigger).transpose()
    }

    async fn list_triggers(&self, workflow_id: &str) -> Result<Vec<WorkflowTrigger>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_triggers WHERE workflow_id = ? ORDER BY created_at ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter().map(row_to_trigger).collect()
    }

    async fn set_trigger_active(&self, id: &Uuid, is_active: bool) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE workflow_triggers SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }
}
