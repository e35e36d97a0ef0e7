//! The comparison feed consumed by the polling dashboard.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::analytics::aggregate;
use crate::core::errors::ApiError;
use crate::server::handlers::parse_filter;
use crate::state::AppState;

/// Fresh aggregation over the filtered execution set. Stateless: each poll
/// recomputes from a snapshot read; an empty result set is a soft empty
/// payload, never an error.
pub async fn get_comparison(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = parse_filter(&params)?;
    let executions = state.executions.list(&filter).await?;
    let report = aggregate(&executions, filter);
    Ok(Json(report))
}

/// Most recent snapshot from the background feed; `null` until the first
/// refresh completes.
pub async fn get_latest_snapshot(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(json!({ "snapshot": state.feed.latest() })))
}
