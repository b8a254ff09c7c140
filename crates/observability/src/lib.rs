//! Process-level observability bootstrap.

pub mod tracing;
