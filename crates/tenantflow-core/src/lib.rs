//! Business logic and repository trait definitions for tenantflow.
//!
//! This crate defines the "ports" (repository and audit traits) that the
//! infrastructure layer implements, the pure condition/rule engine, and the
//! services that drive triggers, versions and executions. It depends only on
//! `tenantflow-types` -- never on `tenantflow-infra` or any database/IO crate.

pub mod engine;
pub mod repository;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;
