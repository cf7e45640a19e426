//! Workflow instance handlers: start, state, next step, checkpoints and
//! lifecycle actions.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use tracing::Instrument;

use waymark_core::auth::paths;
use waymark_observe::attributes::{
    OP_ACTION, OP_CHECKPOINT, OP_HISTORY, OP_LIST_INSTANCES, OP_NEXT_STEP, OP_REPLAY, OP_START,
    OP_STATE, SPAN_OPERATION,
};
use waymark_types::checkpoint::{Checkpoint, CheckpointReceipt, NewCheckpoint};
use waymark_types::instance::{
    ActionResult, InstanceStatus, LifecycleAction, NextStep, StartWorkflow, WorkflowInstance,
};

use crate::http::error::AppError;
use crate::http::extractors::actor::Actor;
use crate::http::extractors::query::{CheckpointQuery, InstanceListQuery};
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub template_id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub initial_data: serde_json::Value,
    #[serde(default)]
    pub source_request_id: Option<String>,
    /// Caller-chosen workflow id; generated when absent.
    #[serde(default)]
    pub workflow_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRequest {
    pub step_id: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub complete_step: bool,
    #[serde(default)]
    pub source_request_id: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: LifecycleAction,
    #[serde(default)]
    pub reason: Option<String>,
}

fn workflow_href(workflow_id: &str) -> String {
    format!("/api/v1/workflows/{workflow_id}")
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

/// POST /api/v1/workflows - Start an instance of a registered template.
pub async fn start_workflow(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<StartRequest>,
) -> Result<Json<ApiResponse<WorkflowInstance>>, AppError> {
    let timer = RequestTimer::start();
    let span = tracing::info_span!(
        SPAN_OPERATION,
        op = OP_START,
        actor = %actor.0,
        template_id = %body.template_id
    );

    async move {
        actor.authorize(&state, &paths::template(&body.template_id))?;

        let inst = state
            .context
            .start(StartWorkflow {
                template_id: body.template_id,
                version: body.version,
                initial_data: body.initial_data,
                created_by: actor.0,
                source_request_id: body.source_request_id,
                workflow_id: body.workflow_id,
            })
            .await?;

        let href = workflow_href(&inst.workflow_id);
        let next = format!("{href}/next");
        Ok(Json(
            timer
                .finish(inst)
                .with_link("self", &href)
                .with_link("next", &next),
        ))
    }
    .instrument(span)
    .await
}

/// GET /api/v1/workflows - List instances, optionally by status.
pub async fn list_workflows(
    State(state): State<AppState>,
    Query(query): Query<InstanceListQuery>,
) -> Result<Json<ApiResponse<Vec<WorkflowInstance>>>, AppError> {
    let timer = RequestTimer::start();
    let status = match &query.status {
        Some(s) => Some(s.parse::<InstanceStatus>().map_err(AppError::Validation)?),
        None => None,
    };

    let instances = state
        .context
        .list_instances(status)
        .instrument(tracing::debug_span!(SPAN_OPERATION, op = OP_LIST_INSTANCES))
        .await?;
    Ok(Json(timer.finish(instances).with_link("self", "/api/v1/workflows")))
}

/// GET /api/v1/workflows/{id} - Current instance state.
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<ApiResponse<WorkflowInstance>>, AppError> {
    let timer = RequestTimer::start();
    let inst = state
        .context
        .get_state(&workflow_id)
        .instrument(tracing::debug_span!(SPAN_OPERATION, op = OP_STATE, workflow_id = %workflow_id))
        .await?;

    let href = workflow_href(&workflow_id);
    let checkpoints = format!("{href}/checkpoints");
    Ok(Json(
        timer
            .finish(inst)
            .with_link("self", &href)
            .with_link("checkpoints", &checkpoints),
    ))
}

/// GET /api/v1/workflows/{id}/replay - Instance view rebuilt from checkpoints.
pub async fn replay_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<ApiResponse<WorkflowInstance>>, AppError> {
    let timer = RequestTimer::start();
    let inst = state
        .context
        .replay_state(&workflow_id)
        .instrument(tracing::debug_span!(SPAN_OPERATION, op = OP_REPLAY, workflow_id = %workflow_id))
        .await?;
    Ok(Json(timer.finish(inst)))
}

/// GET /api/v1/workflows/{id}/next - Next eligible step.
pub async fn next_step(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<ApiResponse<NextStep>>, AppError> {
    let timer = RequestTimer::start();
    let next = state
        .context
        .next_step(&workflow_id)
        .instrument(tracing::debug_span!(SPAN_OPERATION, op = OP_NEXT_STEP, workflow_id = %workflow_id))
        .await?;
    Ok(Json(timer.finish(next)))
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

/// GET /api/v1/workflows/{id}/checkpoints - Full history, or `?step=` for the
/// latest checkpoint of one step.
pub async fn list_checkpoints(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<CheckpointQuery>,
) -> Result<Json<ApiResponse<Vec<Checkpoint>>>, AppError> {
    let timer = RequestTimer::start();
    let span = tracing::debug_span!(SPAN_OPERATION, op = OP_HISTORY, workflow_id = %workflow_id);

    let checkpoints: Vec<Checkpoint> = async {
        match &query.step {
            Some(step_id) => {
                let latest = state.context.latest_checkpoint(&workflow_id, step_id).await?;
                Ok::<_, AppError>(latest.into_iter().collect())
            }
            None => Ok(state.context.list_checkpoints(&workflow_id).await?),
        }
    }
    .instrument(span)
    .await?;

    Ok(Json(timer.finish(checkpoints)))
}

/// POST /api/v1/workflows/{id}/checkpoints - Record progress on a step.
pub async fn record_checkpoint(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    actor: Actor,
    Json(body): Json<CheckpointRequest>,
) -> Result<Json<ApiResponse<CheckpointReceipt>>, AppError> {
    let timer = RequestTimer::start();
    let span = tracing::info_span!(
        SPAN_OPERATION,
        op = OP_CHECKPOINT,
        actor = %actor.0,
        workflow_id = %workflow_id,
        step_id = %body.step_id
    );

    async move {
        actor.authorize(&state, &paths::step(&workflow_id, &body.step_id))?;

        let receipt = state
            .context
            .checkpoint(NewCheckpoint {
                workflow_id: workflow_id.clone(),
                step_id: body.step_id,
                data: body.data,
                notes: body.notes,
                complete_step: body.complete_step,
                source_request_id: body.source_request_id,
                idempotency_key: body.idempotency_key,
            })
            .await?;

        let next = format!("{}/next", workflow_href(&workflow_id));
        Ok(Json(timer.finish(receipt).with_link("next", &next)))
    }
    .instrument(span)
    .await
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// POST /api/v1/workflows/{id}/actions - pause, resume or fail.
pub async fn apply_action(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    actor: Actor,
    Json(body): Json<ActionRequest>,
) -> Result<Json<ApiResponse<ActionResult>>, AppError> {
    let timer = RequestTimer::start();
    let span = tracing::info_span!(
        SPAN_OPERATION,
        op = OP_ACTION,
        actor = %actor.0,
        workflow_id = %workflow_id,
        action = %body.action
    );

    async move {
        actor.authorize(&state, &paths::workflow(&workflow_id))?;
        let result = state
            .context
            .apply_action(&workflow_id, body.action, body.reason.as_deref())
            .await?;
        Ok(Json(timer.finish(result)))
    }
    .instrument(span)
    .await
}
