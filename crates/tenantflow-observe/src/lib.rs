//! Observability setup for tenantflow: structured logging with optional
//! OpenTelemetry span export.

pub mod tracing_setup;
