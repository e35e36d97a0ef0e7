use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{analytics, comparison, documents, executions, health, query};
use crate::state::AppState;

/// Creates the application router.
///
/// Every read endpoint answers each request independently and statelessly;
/// the dashboard polls them on a fixed interval with no server-side cursor.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state);

    Router::new()
        .route("/health", get(health::health))
        .route("/api/query", post(query::run_query))
        .route("/api/documents", post(documents::upload_document))
        .route(
            "/api/executions",
            get(executions::list_executions).delete(executions::purge_executions),
        )
        .route("/api/executions/:execution_id", get(executions::get_execution))
        .route("/api/comparison", get(comparison::get_comparison))
        .route("/api/comparison/latest", get(comparison::get_latest_snapshot))
        .route("/api/analytics/stats", get(analytics::get_stats))
        .route("/api/analytics/rankings", get(analytics::get_rankings))
        .route("/api/analytics/analyze", post(analytics::analyze))
        .route("/api/analytics/analyses", get(analytics::list_analyses))
        .route(
            "/api/analytics/analyses/:analysis_id",
            get(analytics::get_analysis).delete(analytics::delete_analysis),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .settings
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
}
