use thiserror::Error;

use crate::template::dag::DagError;

/// Errors raised while building or starting an ad-hoc plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("intent must not be empty")]
    EmptyIntent,

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("step '{step_id}' ran before its dependency '{missing_id}' produced a result")]
    UnsatisfiedDependency { step_id: String, missing_id: String },

    #[error("invalid plan structure: {0}")]
    Structure(#[from] DagError),
}

/// Errors returned by tool invocations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("tool execution failed: {0}")]
    Execution(String),

    #[error("tool timed out after {0}s")]
    Timeout(u64),

    #[error("tool produced invalid output: {0}")]
    InvalidOutput(String),
}
