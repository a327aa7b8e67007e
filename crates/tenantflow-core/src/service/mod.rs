//! Engine services.
//!
//! Each service is generic over the repository ports it needs so the core
//! crate never depends on tenantflow-infra.

pub mod audit;
pub mod execution;
pub mod trigger;
pub mod version;
