//! SQLite workflow version repository implementation.
//!
//! Implements `VersionRepository` from `tenantflow-core`. The active-flag
//! handover runs in a single transaction guarded by a compare-and-set on the
//! superseded row and by the partial unique index on active versions.

use sqlx::Row;
use tenantflow_core::repository::version::VersionRepository;
use tenantflow_types::error::RepositoryError;
use tenantflow_types::workflow::{StepDefinition, TriggerSpec, WorkflowVersion};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, query_error, to_json, write_error};

/// SQLite-backed implementation of `VersionRepository`.
#[derive(Clone)]
pub struct SqliteVersionRepository {
    pool: DatabasePool,
}

impl SqliteVersionRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to `WorkflowVersion`.
struct VersionRow {
    id: String,
    workflow_id: String,
    company_id: String,
    version_number: i64,
    name: String,
    description: Option<String>,
    trigger_spec: Option<String>,
    steps: String,
    is_active: bool,
    created_by: String,
    change_notes: Option<String>,
    total_executions: i64,
    created_at: String,
}

impl VersionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            company_id: row.try_get("company_id")?,
            version_number: row.try_get("version_number")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            trigger_spec: row.try_get("trigger_spec")?,
            steps: row.try_get("steps")?,
            is_active: row.try_get("is_active")?,
            created_by: row.try_get("created_by")?,
            change_notes: row.try_get("change_notes")?,
            total_executions: row.try_get("total_executions")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_version(self) -> Result<WorkflowVersion, RepositoryError> {
        let id = self
            .id
            .parse::<Uuid>()
            .map_err(|e| RepositoryError::Query(format!("invalid version id: {e}")))?;
        let trigger = self
            .trigger_spec
            .as_deref()
            .map(|s| from_json::<TriggerSpec>(s, "trigger"))
            .transpose()?;
        let steps: Vec<StepDefinition> = from_json(&self.steps, "steps")?;

        Ok(WorkflowVersion {
            id,
            workflow_id: self.workflow_id,
            company_id: self.company_id,
            version_number: self.version_number,
            name: self.name,
            description: self.description,
            trigger,
            steps,
            is_active: self.is_active,
            created_by: self.created_by,
            change_notes: self.change_notes,
            total_executions: self.total_executions,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn rows_to_versions(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<WorkflowVersion>, RepositoryError> {
    rows.iter()
        .map(|row| {
            VersionRow::from_row(row)
                .map_err(query_error)?
                .into_version()
        })
        .collect()
}

/// Clear the active flag on `id` only if it is still set.
async fn deactivate_if_active(
    tx: &mut sqlx::SqliteConnection,
    id: &Uuid,
) -> Result<(), RepositoryError> {
    let result = sqlx::query("UPDATE workflow_versions SET is_active = 0 WHERE id = ? AND is_active = 1")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;
    if result.rows_affected() != 1 {
        return Err(RepositoryError::Conflict(format!(
            "version {id} is no longer active"
        )));
    }
    Ok(())
}

impl VersionRepository for SqliteVersionRepository {
    async fn commit_version(
        &self,
        version: &WorkflowVersion,
        supersedes: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        let trigger_json = version.trigger.as_ref().map(to_json).transpose()?;
        let steps_json = to_json(&version.steps)?;

        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        if let Some(old) = supersedes {
            deactivate_if_active(&mut *tx, &old).await?;
        }

        sqlx::query(
            "INSERT INTO workflow_versions (id, workflow_id, company_id, version_number, name, description, trigger_spec, steps, is_active, created_by, change_notes, total_executions, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(version.id.to_string())
        .bind(&version.workflow_id)
        .bind(&version.company_id)
        .bind(version.version_number)
        .bind(&version.name)
        .bind(&version.description)
        .bind(&trigger_json)
        .bind(&steps_json)
        .bind(version.is_active)
        .bind(&version.created_by)
        .bind(&version.change_notes)
        .bind(version.total_executions)
        .bind(format_datetime(&version.created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            write_error(e, || {
                format!(
                    "version {} of workflow '{}' conflicts with an existing row",
                    version.version_number, version.workflow_id
                )
            })
        })?;

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn activate_version(
        &self,
        version_id: &Uuid,
        supersedes: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        if let Some(old) = supersedes {
            deactivate_if_active(&mut *tx, &old).await?;
        }

        let result =
            sqlx::query("UPDATE workflow_versions SET is_active = 1 WHERE id = ? AND is_active = 0")
                .bind(version_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    write_error(e, || "another version of the workflow is active".to_string())
                })?;
        if result.rows_affected() != 1 {
            return Err(RepositoryError::Conflict(format!(
                "version {version_id} is missing or already active"
            )));
        }

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn get_version(&self, id: &Uuid) -> Result<Option<WorkflowVersion>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_versions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(
                VersionRow::from_row(&row).map_err(query_error)?.into_version()?,
            )),
            None => Ok(None),
        }
    }

    async fn list_versions(&self, workflow_id: &str) -> Result<Vec<WorkflowVersion>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_versions WHERE workflow_id = ? ORDER BY version_number ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows_to_versions(&rows)
    }

    async fn get_active_version(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowVersion>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_versions WHERE workflow_id = ? AND is_active = 1")
            .bind(workflow_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(
                VersionRow::from_row(&row).map_err(query_error)?.into_version()?,
            )),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_support::{make_version, test_pool};

    #[tokio::test]
    async fn test_commit_and_get_version() {
        let repo = SqliteVersionRepository::new(test_pool().await);
        let version = make_version("renewals", 1, true);
        repo.commit_version(&version, None).await.unwrap();

        let loaded = repo.get_version(&version.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, version.id);
        assert_eq!(loaded.steps, version.steps);
        assert_eq!(loaded.trigger, version.trigger);
        assert!(loaded.is_active);

        let active = repo.get_active_version("renewals").await.unwrap().unwrap();
        assert_eq!(active.id, version.id);
    }

    #[tokio::test]
    async fn test_commit_supersedes_atomically() {
        let repo = SqliteVersionRepository::new(test_pool().await);
        let v1 = make_version("renewals", 1, true);
        repo.commit_version(&v1, None).await.unwrap();
        let v2 = make_version("renewals", 2, true);
        repo.commit_version(&v2, Some(v1.id)).await.unwrap();

        let all = repo.list_versions("renewals").await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(!all[0].is_active);
        assert!(all[1].is_active);
    }

    #[tokio::test]
    async fn test_stale_supersede_is_conflict_and_writes_nothing() {
        let repo = SqliteVersionRepository::new(test_pool().await);
        let v1 = make_version("renewals", 1, true);
        repo.commit_version(&v1, None).await.unwrap();
        let v2 = make_version("renewals", 2, true);
        repo.commit_version(&v2, Some(v1.id)).await.unwrap();

        // v1 is no longer active, so superseding it again must fail
        let v3 = make_version("renewals", 3, true);
        let err = repo.commit_version(&v3, Some(v1.id)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert!(repo.get_version(&v3.id).await.unwrap().is_none());
        assert_eq!(repo.get_active_version("renewals").await.unwrap().unwrap().id, v2.id);
    }

    #[tokio::test]
    async fn test_second_active_row_is_conflict() {
        let repo = SqliteVersionRepository::new(test_pool().await);
        repo.commit_version(&make_version("renewals", 1, true), None)
            .await
            .unwrap();
        let err = repo
            .commit_version(&make_version("renewals", 2, true), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_duplicate_version_number_is_conflict() {
        let repo = SqliteVersionRepository::new(test_pool().await);
        repo.commit_version(&make_version("renewals", 1, false), None)
            .await
            .unwrap();
        let err = repo
            .commit_version(&make_version("renewals", 1, false), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_activate_version_rolls_back() {
        let repo = SqliteVersionRepository::new(test_pool().await);
        let v1 = make_version("renewals", 1, true);
        repo.commit_version(&v1, None).await.unwrap();
        let v2 = make_version("renewals", 2, true);
        repo.commit_version(&v2, Some(v1.id)).await.unwrap();

        repo.activate_version(&v1.id, Some(v2.id)).await.unwrap();
        assert_eq!(repo.get_active_version("renewals").await.unwrap().unwrap().id, v1.id);

        // already active
        let err = repo.activate_version(&v1.id, None).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_versions_scoped_and_ordered() {
        let repo = SqliteVersionRepository::new(test_pool().await);
        repo.commit_version(&make_version("renewals", 2, false), None)
            .await
            .unwrap();
        repo.commit_version(&make_version("renewals", 1, false), None)
            .await
            .unwrap();
        repo.commit_version(&make_version("deposits", 1, false), None)
            .await
            .unwrap();

        let numbers: Vec<i64> = repo
            .list_versions("renewals")
            .await
            .unwrap()
            .iter()
            .map(|v| v.version_number)
            .collect();
        assert_eq!(numbers, vec![1, 2]);
        assert!(repo.get_active_version("renewals").await.unwrap().is_none());
    }
}
