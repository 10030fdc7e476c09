//! Observability setup for stepweave: tracing subscriber and optional
//! OpenTelemetry span export.

pub mod tracing_setup;
