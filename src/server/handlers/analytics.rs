//! Analytics endpoints: aggregated stats, rankings, and the persisted
//! LLM-generated comparative analyses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::analytics::{aggregate, render_summary};
use crate::core::errors::ApiError;
use crate::llm::{prompts, ChatRequest};
use crate::model::ExecutionFilter;
use crate::server::handlers::parse_filter;
use crate::state::AppState;
use crate::store::NewAnalysis;

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = parse_filter(&params)?;
    let executions = state.executions.list(&filter).await?;
    let report = aggregate(&executions, filter);
    Ok(Json(json!({
        "rows": report.rows,
        "filters_applied": report.filters_applied,
    })))
}

pub async fn get_rankings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = parse_filter(&params)?;
    let executions = state.executions.list(&filter).await?;
    let report = aggregate(&executions, filter);
    Ok(Json(json!({
        "rankings": report.rankings,
        "filters_applied": report.filters_applied,
    })))
}

/// Full comparative analysis: aggregate, rank, and ask the LLM for a
/// narrative. An LLM failure falls back to the deterministic summary; the
/// result is persisted either way.
pub async fn analyze(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let started = Instant::now();

    let executions = state.executions.list(&ExecutionFilter::default()).await?;
    let report = aggregate(&executions, ExecutionFilter::default());
    let summary = render_summary(&report);

    let narrative = if report.is_empty() {
        summary.clone()
    } else {
        let request = ChatRequest::new(prompts::analysis_prompt(&summary))
            .with_temperature(0.3)
            .with_max_output_tokens(1500);
        match state.services.llm.chat(request).await {
            Ok(outcome) if !outcome.text.trim().is_empty() => outcome.text,
            Ok(_) => summary.clone(),
            Err(err) => {
                tracing::warn!("analysis generation failed, using summary: {}", err);
                summary.clone()
            }
        }
    };

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    let analysis_id = state
        .analyses
        .save(NewAnalysis {
            question: "full comparative analysis".to_string(),
            response: narrative.clone(),
            report: Some(serde_json::to_value(&report).map_err(ApiError::internal)?),
            duration_ms: Some(duration_ms),
        })
        .await?;

    Ok(Json(json!({
        "analysis_id": analysis_id,
        "response": narrative,
        "report": report,
        "duration_ms": duration_ms,
    })))
}

pub async fn list_analyses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = parse_filter(&params)?;
    let limit = filter.limit.unwrap_or(50).clamp(1, 100);
    let offset = filter.offset.unwrap_or(0).max(0);

    let analyses = state
        .analyses
        .list(filter.from, filter.to, limit, offset)
        .await?;
    let count = analyses.len();
    Ok(Json(json!({
        "analyses": analyses,
        "count": count,
    })))
}

pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(analysis_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let analysis = state.analyses.get(analysis_id).await?;
    Ok(Json(json!({ "analysis": analysis })))
}

pub async fn delete_analysis(
    State(state): State<Arc<AppState>>,
    Path(analysis_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.analyses.delete(analysis_id).await? {
        return Err(ApiError::NotFound(format!(
            "analysis {} not found",
            analysis_id
        )));
    }
    Ok(Json(json!({ "deleted": true })))
}
