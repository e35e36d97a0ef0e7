//! The query endpoint: run a technique pipeline, record the execution,
//! return the answer with its metrics.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::model::{ExecutionMetrics, NewExecution, Technique};
use crate::rag::{pipeline, TechniqueRun};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub technique: String,
    pub top_k: Option<usize>,
    #[serde(default)]
    pub enable_evaluation: bool,
}

pub async fn run_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let technique = Technique::parse(&payload.technique)?;
    if payload.query.trim().is_empty() {
        return Err(ApiError::Validation("query must not be empty".to_string()));
    }
    let top_k = payload.top_k.unwrap_or(state.settings.top_k).clamp(1, 20);

    let started = Instant::now();
    let run = match pipeline::run(&state.services, technique, &payload.query, top_k).await {
        Ok(run) => run,
        Err(err) => {
            record_failed_run(&state, &payload.query, technique, started, &err).await;
            return Err(err);
        }
    };

    let mut metrics = derive_metrics(&state, &run, started);

    if payload.enable_evaluation {
        let contexts: Vec<String> = run.sources.iter().map(|s| s.content.clone()).collect();
        let scores = state
            .evaluator
            .evaluate(&payload.query, &run.answer, &contexts)
            .await;
        metrics.faithfulness = scores.faithfulness;
        metrics.answer_relevancy = scores.answer_relevancy;
        metrics.context_precision = scores.context_precision;
        metrics.context_recall = scores.context_recall;
    }

    let execution_id = state
        .executions
        .record(NewExecution {
            query: payload.query.clone(),
            technique,
            answer: run.answer.clone(),
            sources: run.sources.clone(),
            steps: json!(run.steps),
            metrics: metrics.clone(),
        })
        .await?;

    tracing::info!(
        "query recorded: id={} technique={} latency_ms={:.1}",
        execution_id,
        technique,
        metrics.latency_ms
    );

    Ok(Json(json!({
        "execution_id": execution_id,
        "query": payload.query,
        "technique": technique,
        "answer": run.answer,
        "sources": run.sources,
        "metrics": metrics,
    })))
}

fn derive_metrics(state: &AppState, run: &TechniqueRun, started: Instant) -> ExecutionMetrics {
    let settings = &state.settings;
    let cost_usd = run.usage.map(|usage| {
        usage.input as f64 * settings.price_per_mtok_input / 1_000_000.0
            + usage.output as f64 * settings.price_per_mtok_output / 1_000_000.0
    });

    ExecutionMetrics {
        latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        tokens_input: run.usage.map(|u| u.input),
        tokens_output: run.usage.map(|u| u.output),
        tokens_total: run.usage.map(|u| u.total),
        cost_usd,
        chunks_retrieved: Some(run.chunks_retrieved),
        chunks_used: Some(run.sources.len() as i64),
        ..Default::default()
    }
}

/// A failed run is still an execution: record it with an empty answer and
/// the failure in its step trace, then surface the original error.
async fn record_failed_run(
    state: &AppState,
    query: &str,
    technique: Technique,
    started: Instant,
    err: &ApiError,
) {
    let record = NewExecution {
        query: query.to_string(),
        technique,
        answer: String::new(),
        sources: Vec::new(),
        steps: json!([{ "step": "error", "error": err.to_string() }]),
        metrics: ExecutionMetrics {
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
            ..Default::default()
        },
    };

    if let Err(record_err) = state.executions.record(record).await {
        tracing::error!("failed to record failed run: {}", record_err);
    }
}
