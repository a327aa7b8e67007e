//! API key storage for the HTTP surface.
//!
//! Keys are shown to the operator once at creation and stored only as a
//! lowercase hex SHA-256 digest.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::Row;
use tenantflow_types::error::RepositoryError;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, query_error, write_error};

const KEY_PREFIX: &str = "tflow_";

/// Compute SHA-256 hash of an API key (lowercase hex).
pub fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{:x}", digest)
}

/// SQLite-backed API key store.
#[derive(Clone)]
pub struct SqliteApiKeyStore {
    pool: DatabasePool,
}

impl SqliteApiKeyStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Create a key for `owner_email` and return the plaintext.
    pub async fn create(&self, owner_email: &str, name: &str) -> Result<String, RepositoryError> {
        let plaintext = format!(
            "{KEY_PREFIX}{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        );

        sqlx::query(
            "INSERT INTO api_keys (id, key_hash, owner_email, name, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(hash_api_key(&plaintext))
        .bind(owner_email)
        .bind(name)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| write_error(e, || "api key collision".to_string()))?;

        Ok(plaintext)
    }

    /// Resolve a presented key to its owner's email.
    ///
    /// Touches `last_used_at` on success; a failure there does not fail
    /// the lookup.
    pub async fn authenticate(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT id, owner_email FROM api_keys WHERE key_hash = ?")
            .bind(hash_api_key(key))
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: String = row.try_get("id").map_err(query_error)?;
        let owner_email: String = row.try_get("owner_email").map_err(query_error)?;

        if let Err(e) = sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(format_datetime(&Utc::now()))
            .bind(&id)
            .execute(&self.pool.writer)
            .await
        {
            tracing::debug!(key_id = %id, "failed to touch api key: {e}");
        }

        Ok(Some(owner_email))
    }
}
