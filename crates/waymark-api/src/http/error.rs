//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use waymark_core::orchestrate::error::PlanError;
use waymark_core::workflow::checkpoint::CheckpointError;
use waymark_core::workflow::error::OrchestratorError;
use waymark_types::error::RepositoryError;

use crate::http::response::ApiResponse;

#[derive(Debug)]
pub enum AppError {
    Orchestrator(OrchestratorError),
    /// Missing or unusable actor identity.
    Unauthorized(String),
    /// The authorizer refused the call.
    Forbidden(Vec<String>),
    Validation(String),
}

impl From<OrchestratorError> for AppError {
    fn from(e: OrchestratorError) -> Self {
        AppError::Orchestrator(e)
    }
}

fn orchestrator_status(err: &OrchestratorError) -> StatusCode {
    match err {
        OrchestratorError::TemplateNotFound(_)
        | OrchestratorError::InstanceNotFound(_)
        | OrchestratorError::UnknownStep { .. } => StatusCode::NOT_FOUND,
        OrchestratorError::TemplateExists(_)
        | OrchestratorError::InvalidTransition { .. }
        | OrchestratorError::InstanceNotActive { .. } => StatusCode::CONFLICT,
        OrchestratorError::Template(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::Checkpoint(CheckpointError::EmptyStepId) => StatusCode::BAD_REQUEST,
        OrchestratorError::Checkpoint(_) => StatusCode::INTERNAL_SERVER_ERROR,
        OrchestratorError::Plan(PlanError::EmptyIntent) => StatusCode::BAD_REQUEST,
        OrchestratorError::Plan(PlanError::UnknownTool(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        OrchestratorError::Plan(_) => StatusCode::INTERNAL_SERVER_ERROR,
        OrchestratorError::Storage(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        OrchestratorError::Storage(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
        OrchestratorError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Orchestrator(e) => orchestrator_status(e),
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Orchestrator(e) => e.code(),
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let (message, details) = match &self {
            AppError::Orchestrator(e) => (e.to_string(), None),
            AppError::Unauthorized(msg) | AppError::Validation(msg) => (msg.clone(), None),
            AppError::Forbidden(reasons) => (
                "Not authorized".to_string(),
                Some(serde_json::json!({ "reasons": reasons })),
            ),
        };

        if status.is_server_error() {
            tracing::error!(code, "{message}");
        }

        (status, Json(ApiResponse::error(code, &message, details))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waymark_types::instance::InstanceStatus;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (OrchestratorError::InstanceNotFound("wf".into()), StatusCode::NOT_FOUND),
            (OrchestratorError::TemplateExists("t@1".into()), StatusCode::CONFLICT),
            (
                OrchestratorError::InvalidTransition {
                    from: InstanceStatus::Active,
                    to: InstanceStatus::Active,
                },
                StatusCode::CONFLICT,
            ),
            (
                OrchestratorError::Plan(PlanError::UnknownTool("x".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (OrchestratorError::Plan(PlanError::EmptyIntent), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn test_forbidden_code() {
        let err = AppError::Forbidden(vec!["nope".into()]);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "FORBIDDEN");
    }
}
