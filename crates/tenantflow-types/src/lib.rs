//! Shared domain types for tenantflow.
//!
//! This crate contains the domain model of the workflow automation engine:
//! versions, triggers, conditions, executions, audit entries, configuration,
//! and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod audit;
pub mod condition;
pub mod config;
pub mod error;
pub mod execution;
pub mod workflow;
