//! Execution history: point lookups, filtered listings, purge.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::server::handlers::parse_filter;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 100;

pub async fn list_executions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let mut filter = parse_filter(&params)?;
    if filter.limit.is_none() {
        filter.limit = Some(DEFAULT_LIST_LIMIT);
    }

    let executions = state.executions.list(&filter).await?;
    let total = state.executions.count(&filter).await?;

    Ok(Json(json!({
        "executions": executions,
        "total": total,
        "filters_applied": filter,
    })))
}

pub async fn get_execution(
    State(state): State<Arc<AppState>>,
    Path(execution_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let execution = state.executions.get(execution_id).await?;
    Ok(Json(json!({ "execution": execution })))
}

/// Purge matching executions. Idempotent: an empty match deletes nothing
/// and reports 0.
pub async fn purge_executions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = parse_filter(&params)?;
    let deleted = state.executions.purge(&filter).await?;
    tracing::info!("purged {} executions", deleted);
    Ok(Json(json!({ "deleted": deleted })))
}
