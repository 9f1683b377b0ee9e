//! Observability setup for flowbridge: structured logging and optional
//! OpenTelemetry trace export.

pub mod tracing_setup;
