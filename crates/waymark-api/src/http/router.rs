//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`. Middleware: CORS, tracing.

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Templates
        .route(
            "/templates",
            get(handlers::template::list_templates).post(handlers::template::register_template),
        )
        .route("/templates/{id}", get(handlers::template::get_template))
        // Workflow instances
        .route(
            "/workflows",
            get(handlers::workflow::list_workflows).post(handlers::workflow::start_workflow),
        )
        .route("/workflows/{id}", get(handlers::workflow::get_workflow))
        .route("/workflows/{id}/next", get(handlers::workflow::next_step))
        .route("/workflows/{id}/replay", get(handlers::workflow::replay_workflow))
        .route(
            "/workflows/{id}/checkpoints",
            get(handlers::workflow::list_checkpoints).post(handlers::workflow::record_checkpoint),
        )
        .route("/workflows/{id}/actions", post(handlers::workflow::apply_action))
        // Ad-hoc orchestration
        .route("/orchestrate", post(handlers::orchestrate::orchestrate))
        .route("/tools", get(handlers::orchestrate::list_tools))
        .route("/health", get(health_check));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /api/v1/health - Liveness plus the active-instance gauge.
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "activeInstances": state.context.active_count(),
        "templates": state.context.list_templates(None).len(),
    }))
}
