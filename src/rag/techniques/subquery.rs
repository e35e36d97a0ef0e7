//! Sub-query RAG: decompose a multi-part question, search per part.

use std::time::Instant;

use serde_json::json;

use crate::core::errors::ApiError;
use crate::llm::{prompts, ChatRequest};
use crate::model::Technique;
use crate::rag::pipeline::{
    dedupe_best, generate, merge_usage, parse_lines, search_many, step, to_source, RagServices,
    TechniqueRun,
};

const MAX_SUBQUERIES: usize = 3;

pub async fn run(
    services: &RagServices,
    query: &str,
    top_k: usize,
) -> Result<TechniqueRun, ApiError> {
    let mut steps = Vec::new();
    let mut usage = None;

    let started = Instant::now();
    let decompose_outcome = services
        .llm
        .chat(
            ChatRequest::new(prompts::decompose_prompt(query, MAX_SUBQUERIES))
                .with_temperature(services.temperature)
                .with_max_output_tokens(200),
        )
        .await?;
    merge_usage(&mut usage, decompose_outcome.usage);

    let mut subqueries = parse_lines(&decompose_outcome.text, MAX_SUBQUERIES);
    if subqueries.is_empty() {
        subqueries.push(query.to_string());
    }
    steps.push(step(
        "decompose_query",
        started,
        json!({ "num_subqueries": subqueries.len() }),
    ));

    let started = Instant::now();
    let all_hits: Vec<_> = search_many(services, &subqueries, top_k)
        .await?
        .into_iter()
        .flatten()
        .collect();
    let total_retrieved = all_hits.len();
    steps.push(step(
        "multi_subquery_search",
        started,
        json!({ "num_subqueries": subqueries.len(), "total_retrieved": total_retrieved }),
    ));

    let mut merged = dedupe_best(all_hits);
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(top_k);

    let sources: Vec<_> = merged.iter().map(to_source).collect();

    let started = Instant::now();
    let outcome = generate(services, Technique::Subquery, query, &sources).await?;
    merge_usage(&mut usage, outcome.usage);
    steps.push(step("llm_generation", started, json!({})));

    Ok(TechniqueRun {
        answer: outcome.text,
        chunks_retrieved: total_retrieved as i64,
        sources,
        steps,
        usage,
    })
}
