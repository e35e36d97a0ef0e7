//! Domain types shared by the recorder, the pipelines and the analytics
//! engine.
//!
//! Metric fields are independently nullable: `None` means "not computed",
//! which is distinct from a genuine 0.0 score. Aggregation depends on this
//! distinction, so nothing in this module coerces an absent value to zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

/// A named retrieval/generation strategy, selected per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    Baseline,
    Hyde,
    Reranking,
    Fusion,
    Subquery,
    Graph,
    Agentic,
    Adaptive,
}

impl Technique {
    pub const ALL: [Technique; 8] = [
        Technique::Baseline,
        Technique::Hyde,
        Technique::Reranking,
        Technique::Fusion,
        Technique::Subquery,
        Technique::Graph,
        Technique::Agentic,
        Technique::Adaptive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Technique::Baseline => "baseline",
            Technique::Hyde => "hyde",
            Technique::Reranking => "reranking",
            Technique::Fusion => "fusion",
            Technique::Subquery => "subquery",
            Technique::Graph => "graph",
            Technique::Agentic => "agentic",
            Technique::Adaptive => "adaptive",
        }
    }

    /// Parse a technique tag. Unknown tags are a validation error at every
    /// boundary that accepts free-form input.
    pub fn parse(tag: &str) -> Result<Technique, ApiError> {
        Technique::ALL
            .into_iter()
            .find(|t| t.as_str() == tag)
            .ok_or_else(|| ApiError::Validation(format!("unknown technique '{}'", tag)))
    }
}

impl std::fmt::Display for Technique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retrieved chunk backing an answer.
///
/// `score` is the relevance the technique finally assigned (post-rerank for
/// the reranking pipeline, which keeps the bi-encoder score in
/// `pre_rerank_score`). The order of a `sources` list is retrieval rank,
/// not necessarily score order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceChunk {
    pub content: String,
    pub score: f64,
    pub document: String,
    pub chunk_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_rerank_score: Option<f64>,
}

/// Metrics recorded with one execution. Quality sub-scores are present only
/// when evaluation ran for that execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub latency_ms: f64,
    pub tokens_input: Option<i64>,
    pub tokens_output: Option<i64>,
    pub tokens_total: Option<i64>,
    pub cost_usd: Option<f64>,
    pub chunks_retrieved: Option<i64>,
    pub chunks_used: Option<i64>,
    pub faithfulness: Option<f64>,
    pub answer_relevancy: Option<f64>,
    pub context_precision: Option<f64>,
    pub context_recall: Option<f64>,
}

/// One persisted query run. Append-only: created once at the end of a run
/// (successful or explicitly failed), never updated, deleted only by purge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: i64,
    pub query: String,
    pub technique: Technique,
    pub answer: String,
    pub sources: Vec<SourceChunk>,
    pub steps: Value,
    pub metrics: ExecutionMetrics,
    pub created_at: DateTime<Utc>,
}

/// Input to the recorder; id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub query: String,
    pub technique: Technique,
    pub answer: String,
    pub sources: Vec<SourceChunk>,
    pub steps: Value,
    pub metrics: ExecutionMetrics,
}

/// Filter shared by listing, purge and aggregation. An empty technique set
/// means "all techniques"; date bounds are inclusive.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionFilter {
    pub techniques: Vec<Technique>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}
