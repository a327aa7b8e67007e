//! HTTP/REST API layer for tenantflow.
//!
//! Axum-based REST API at `/api/v1/` with API key authentication on every
//! route except the inbound trigger webhook and `/health`.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod router;
