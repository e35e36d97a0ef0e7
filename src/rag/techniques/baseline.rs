//! Baseline RAG: embed -> search -> generate.
//!
//! The foundation all other techniques are compared against.

use std::time::Instant;

use serde_json::json;

use crate::core::errors::ApiError;
use crate::model::Technique;
use crate::rag::pipeline::{generate, merge_usage, search, step, to_source, RagServices, TechniqueRun};

pub async fn run(
    services: &RagServices,
    query: &str,
    top_k: usize,
) -> Result<TechniqueRun, ApiError> {
    let mut steps = Vec::new();
    let mut usage = None;

    let started = Instant::now();
    let hits = search(services, query, top_k).await?;
    steps.push(step(
        "similarity_search",
        started,
        json!({ "chunks_retrieved": hits.len(), "top_k": top_k }),
    ));

    let sources: Vec<_> = hits.iter().map(to_source).collect();

    let started = Instant::now();
    let outcome = generate(services, Technique::Baseline, query, &sources).await?;
    merge_usage(&mut usage, outcome.usage);
    steps.push(step("llm_generation", started, json!({})));

    Ok(TechniqueRun {
        answer: outcome.text,
        chunks_retrieved: hits.len() as i64,
        sources,
        steps,
        usage,
    })
}
