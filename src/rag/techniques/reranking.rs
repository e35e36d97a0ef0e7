//! Reranking RAG: over-retrieve, then let a cross-encoder pick.
//!
//! The bi-encoder score each hit arrived with is kept as
//! `pre_rerank_score`; the recorded relevance is the cross-encoder's.

use std::time::Instant;

use serde_json::json;

use crate::core::errors::ApiError;
use crate::model::Technique;
use crate::rag::pipeline::{generate, merge_usage, search, step, to_source, RagServices, TechniqueRun};

/// Over-retrieval factor before the rerank cut.
const CANDIDATE_FACTOR: usize = 3;

pub async fn run(
    services: &RagServices,
    query: &str,
    top_k: usize,
) -> Result<TechniqueRun, ApiError> {
    let mut steps = Vec::new();
    let mut usage = None;

    let started = Instant::now();
    let candidates = search(services, query, top_k * CANDIDATE_FACTOR).await?;
    steps.push(step(
        "candidate_search",
        started,
        json!({ "chunks_retrieved": candidates.len(), "top_k": top_k * CANDIDATE_FACTOR }),
    ));

    let documents: Vec<String> = candidates
        .iter()
        .map(|hit| hit.chunk.content.clone())
        .collect();

    let started = Instant::now();
    let hits = services.reranker.rerank(query, &documents, top_k).await?;
    steps.push(step(
        "cross_encoder_rerank",
        started,
        json!({ "candidates": documents.len(), "kept": hits.len() }),
    ));

    let sources: Vec<_> = hits
        .iter()
        .filter_map(|hit| {
            candidates.get(hit.index).map(|candidate| {
                let mut source = to_source(candidate);
                source.pre_rerank_score = Some(candidate.score);
                source.score = hit.relevance_score;
                source
            })
        })
        .collect();

    let started = Instant::now();
    let outcome = generate(services, Technique::Reranking, query, &sources).await?;
    merge_usage(&mut usage, outcome.usage);
    steps.push(step("llm_generation", started, json!({})));

    Ok(TechniqueRun {
        answer: outcome.text,
        chunks_retrieved: candidates.len() as i64,
        sources,
        steps,
        usage,
    })
}
