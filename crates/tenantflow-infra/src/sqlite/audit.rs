//! SQLite audit log implementation.
//!
//! Append-only record of engine changes (versions, triggers, executions).
//! Implements `AuditLogger` for the engine and adds read queries for
//! operators.

use sqlx::Row;
use tenantflow_core::repository::audit::AuditLogger;
use tenantflow_types::audit::{AuditAction, AuditEntry};
use tenantflow_types::error::RepositoryError;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, query_error, to_json};

/// SQLite-backed audit log.
#[derive(Clone)]
pub struct SqliteAuditLogger {
    pool: DatabasePool,
}

impl SqliteAuditLogger {
    /// Create a new audit log backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// All entries recorded against one entity, oldest first.
    pub async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM audit_log WHERE entity_type = ? AND entity_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows_to_entries(&rows)
    }

    /// Most recent entries for a company, newest first.
    pub async fn list_recent(
        &self,
        company_id: &str,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM audit_log WHERE company_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(company_id)
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows_to_entries(&rows)
    }
}

impl AuditLogger for SqliteAuditLogger {
    async fn append(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO audit_log (id, action_type, entity_type, entity_id, user_email, company_id, description, metadata, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.id.to_string())
        .bind(entry.action_type.as_str())
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.user_email)
        .bind(&entry.company_id)
        .bind(&entry.description)
        .bind(to_json(&entry.metadata)?)
        .bind(format_datetime(&entry.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }
}

struct AuditRow {
    id: String,
    action_type: String,
    entity_type: String,
    entity_id: String,
    user_email: String,
    company_id: String,
    description: String,
    metadata: String,
    created_at: String,
}

impl AuditRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            action_type: row.try_get("action_type")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            user_email: row.try_get("user_email")?,
            company_id: row.try_get("company_id")?,
            description: row.try_get("description")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_entry(self) -> Result<AuditEntry, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid audit id: {e}")))?;
        let action_type: AuditAction = self
            .action_type
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(AuditEntry {
            id,
            action_type,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            user_email: self.user_email,
            company_id: self.company_id,
            description: self.description,
            metadata: from_json(&self.metadata, "metadata")?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn rows_to_entries(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<AuditEntry>, RepositoryError> {
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let audit_row = AuditRow::from_row(row).map_err(query_error)?;
        entries.push(audit_row.into_entry()?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_support::test_pool;
    use serde_json::json;

    #[tokio::test]
    async fn test_append_and_list_for_entity() {
        let log = SqliteAuditLogger::new(test_pool().await);
        let execution_id = Uuid::now_v7().to_string();

        log.append(&AuditEntry::new(
            AuditAction::WorkflowTriggered,
            &execution_id,
            "acme",
            "system",
            "Workflow 'renewals' triggered",
        ))
        .await
        .unwrap();
        log.append(
            &AuditEntry::new(
                AuditAction::ExecutionCompleted,
                &execution_id,
                "acme",
                "system",
                "Execution completed",
            )
            .with_metadata(json!({"steps": 3})),
        )
        .await
        .unwrap();

        let entries = log
            .list_for_entity("workflow_execution", &execution_id)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action_type, AuditAction::WorkflowTriggered);
        assert_eq!(entries[1].action_type, AuditAction::ExecutionCompleted);
        assert_eq!(entries[1].metadata["steps"], 3);
    }

    #[tokio::test]
    async fn test_list_recent_scoped_to_company() {
        let log = SqliteAuditLogger::new(test_pool().await);
        for company in ["acme", "acme", "globex"] {
            log.append(&AuditEntry::new(
                AuditAction::TriggerCreated,
                Uuid::now_v7().to_string(),
                company,
                "ops@acme.test",
                "Trigger created",
            ))
            .await
            .unwrap();
        }

        assert_eq!(log.list_recent("acme", 10).await.unwrap().len(), 2);
        assert_eq!(log.list_recent("acme", 1).await.unwrap().len(), 1);
        assert!(log.list_recent("initech", 10).await.unwrap().is_empty());
    }
}
