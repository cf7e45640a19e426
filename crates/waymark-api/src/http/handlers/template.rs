//! Template registry handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use tracing::Instrument;

use waymark_core::auth::paths;
use waymark_core::template::definition::validate_template_value;
use waymark_observe::attributes::{OP_GET_TEMPLATE, OP_LIST_TEMPLATES, OP_REGISTER_TEMPLATE, SPAN_OPERATION};
use waymark_types::template::{TemplateDefinition, TemplateSummary};

use crate::http::error::AppError;
use crate::http::extractors::actor::Actor;
use crate::http::extractors::query::{TemplateListQuery, TemplateQuery};
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// GET /api/v1/templates - List registered templates.
pub async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<TemplateListQuery>,
) -> Json<ApiResponse<Vec<TemplateSummary>>> {
    let timer = RequestTimer::start();
    let _span = tracing::debug_span!(SPAN_OPERATION, op = OP_LIST_TEMPLATES).entered();

    let templates = state.context.list_templates(query.category.as_deref());
    Json(timer.finish(templates).with_link("self", "/api/v1/templates"))
}

/// GET /api/v1/templates/{id} - One template, highest version unless `?version=`.
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TemplateQuery>,
) -> Result<Json<ApiResponse<TemplateDefinition>>, AppError> {
    let timer = RequestTimer::start();
    let _span = tracing::debug_span!(SPAN_OPERATION, op = OP_GET_TEMPLATE, template_id = %id).entered();

    let def = state.context.get_template(&id, query.version.as_deref())?;
    Ok(Json(timer.finish(def.as_ref().clone())))
}

/// POST /api/v1/templates - Validate and register a template.
pub async fn register_template(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<ApiResponse<TemplateSummary>>, AppError> {
    let timer = RequestTimer::start();
    let span = tracing::info_span!(SPAN_OPERATION, op = OP_REGISTER_TEMPLATE, actor = %actor.0);

    async move {
        let def = validate_template_value(body)
            .map_err(|e| AppError::Orchestrator(e.into()))?;
        actor.authorize(&state, &paths::template(&def.id))?;

        let summary = TemplateSummary::from(&def);
        let key = state.context.register_template(def)?;
        tracing::info!(template = %key, "template registered");

        let href = format!("/api/v1/templates/{}?version={}", key.id, key.version);
        Ok(Json(timer.finish(summary).with_link("self", &href)))
    }
    .instrument(span)
    .await
}
