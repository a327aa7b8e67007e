//! Repository trait definitions (ports).
//!
//! These traits define the storage and audit interfaces that the
//! infrastructure layer (tenantflow-infra) implements. The core crate never
//! depends on any specific storage technology.
//!
//! All traits use native async fn in traits (Rust 2024 edition, no
//! async_trait macro).

pub mod audit;
pub mod execution;
pub mod trigger;
pub mod version;
