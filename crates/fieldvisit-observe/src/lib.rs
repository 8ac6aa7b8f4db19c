//! Observability setup for the field-visit draft engine.
//!
//! Structured `tracing` output for the CLI, with optional OpenTelemetry span
//! export for local debugging of save and autosave timings.

pub mod tracing_setup;
