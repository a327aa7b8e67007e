//! Infrastructure layer for tenantflow.
//!
//! Contains implementations of the repository and audit traits defined in
//! `tenantflow-core` (SQLite via sqlx), API key storage, and the
//! configuration loader.

pub mod config;
pub mod sqlite;
