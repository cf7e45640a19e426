use thiserror::Error;
use waymark_types::error::RepositoryError;
use waymark_types::instance::InstanceStatus;

use crate::orchestrate::error::PlanError;
use crate::template::definition::TemplateError;

use super::checkpoint::CheckpointError;

/// Errors surfaced by `OrchestratorContext` operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("template already registered: {0}")]
    TemplateExists(String),

    #[error("workflow instance not found: {0}")]
    InstanceNotFound(String),

    #[error("step '{step_id}' is not part of workflow '{workflow_id}'")]
    UnknownStep { workflow_id: String, step_id: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: InstanceStatus,
        to: InstanceStatus,
    },

    #[error("workflow '{workflow_id}' is {status}, only active instances accept checkpoints")]
    InstanceNotActive {
        workflow_id: String,
        status: InstanceStatus,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

impl OrchestratorError {
    /// Stable machine-readable code for transports.
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::TemplateNotFound(_) => "TEMPLATE_NOT_FOUND",
            OrchestratorError::TemplateExists(_) => "TEMPLATE_EXISTS",
            OrchestratorError::InstanceNotFound(_) => "INSTANCE_NOT_FOUND",
            OrchestratorError::UnknownStep { .. } => "UNKNOWN_STEP",
            OrchestratorError::InvalidTransition { .. } => "INVALID_TRANSITION",
            OrchestratorError::InstanceNotActive { .. } => "INSTANCE_NOT_ACTIVE",
            OrchestratorError::Template(_) => "STRUCTURAL_ERROR",
            OrchestratorError::Checkpoint(_) => "CHECKPOINT_ERROR",
            OrchestratorError::Plan(PlanError::UnknownTool(_)) => "UNKNOWN_TOOL",
            OrchestratorError::Plan(PlanError::UnsatisfiedDependency { .. }) => {
                "UNSATISFIED_DEPENDENCY"
            }
            OrchestratorError::Plan(_) => "INVALID_PLAN",
            OrchestratorError::Storage(_) => "STORAGE_ERROR",
        }
    }
}
