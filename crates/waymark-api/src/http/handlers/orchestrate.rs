//! Ad-hoc orchestration handlers.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use waymark_core::auth::paths;
use waymark_observe::attributes::{OP_LIST_TOOLS, OP_ORCHESTRATE, OP_SYNTHESIZE, SPAN_OPERATION};
use waymark_types::plan::{
    ExecutionResult, OrchestrationPlan, OrchestrationRequest, ToolDescriptor,
};

use crate::http::error::AppError;
use crate::http::extractors::actor::Actor;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrateBody {
    pub intent: String,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub constraints: Option<serde_json::Value>,
    /// Synthesize and score only.
    #[serde(default)]
    pub dry_run: bool,
}

/// Plan plus, unless it was a dry run, its execution.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrateResponse {
    pub plan: OrchestrationPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionResult>,
}

/// POST /api/v1/orchestrate - Synthesize a plan from free text and run it.
///
/// A failed step still answers 200; the execution carries `status: failed`
/// and every result collected before the failure.
pub async fn orchestrate(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<OrchestrateBody>,
) -> Result<Json<ApiResponse<OrchestrateResponse>>, AppError> {
    let timer = RequestTimer::start();
    let op = if body.dry_run { OP_SYNTHESIZE } else { OP_ORCHESTRATE };
    let span = tracing::info_span!(SPAN_OPERATION, op, actor = %actor.0);

    async move {
        actor.authorize(&state, &paths::orchestrate())?;

        let request = OrchestrationRequest {
            intent: body.intent,
            context: body.context,
            constraints: body.constraints,
            actor: Some(actor.0),
        };

        let response = if body.dry_run {
            OrchestrateResponse {
                plan: state.context.synthesize(&request)?,
                execution: None,
            }
        } else {
            let outcome = state.context.orchestrate(&request).await?;
            OrchestrateResponse {
                plan: outcome.plan,
                execution: Some(outcome.execution),
            }
        };

        Ok(Json(timer.finish(response)))
    }
    .instrument(span)
    .await
}

/// GET /api/v1/tools - Registered tool catalogue.
pub async fn list_tools(State(state): State<AppState>) -> Json<ApiResponse<Vec<ToolDescriptor>>> {
    let timer = RequestTimer::start();
    let _span = tracing::debug_span!(SPAN_OPERATION, op = OP_LIST_TOOLS).entered();
    Json(timer.finish(state.context.tool_descriptors()).with_link("self", "/api/v1/tools"))
}
