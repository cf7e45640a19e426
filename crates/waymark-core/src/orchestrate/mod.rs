//! Ad-hoc orchestration: free-text intent -> tool-call DAG -> execution.
//!
//! - `synthesizer` -- topic detection and plan construction
//! - `complexity` -- tool weights and scoring
//! - `tool` -- `Tool` trait, `BoxTool`, `ToolRegistry`
//! - `executor` -- sequential dependency-ordered execution
//!
//! Plans share the DAG primitives in `template::dag` with templates but never
//! touch the template registry.

pub mod complexity;
pub mod error;
pub mod executor;
pub mod synthesizer;
pub mod tool;
