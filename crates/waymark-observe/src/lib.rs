//! Observability for Waymark: subscriber setup and shared span vocabulary.

pub mod attributes;
pub mod tracing_setup;
