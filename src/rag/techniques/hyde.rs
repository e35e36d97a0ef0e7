//! HyDE: search with a hypothetical answer instead of the query.
//!
//! Answers are semantically closer to documents than questions are, so the
//! hypothesis embedding matches better on ambiguous phrasing. Costs one
//! extra LLM call.

use std::time::Instant;

use serde_json::json;

use crate::core::errors::ApiError;
use crate::llm::{prompts, ChatRequest};
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
    let hypothesis_outcome = services
        .llm
        .chat(
            ChatRequest::new(prompts::hypothesis_prompt(query))
                .with_temperature(services.temperature)
                .with_max_output_tokens(300),
        )
        .await?;
    merge_usage(&mut usage, hypothesis_outcome.usage);

    let hypothesis = if hypothesis_outcome.text.trim().is_empty() {
        // Degenerate hypothesis: fall back to the raw query.
        query.to_string()
    } else {
        hypothesis_outcome.text
    };
    steps.push(step(
        "generate_hypothesis",
        started,
        json!({ "hypothesis_chars": hypothesis.chars().count() }),
    ));

    let started = Instant::now();
    let hits = search(services, &hypothesis, top_k).await?;
    steps.push(step(
        "hypothesis_search",
        started,
        json!({ "chunks_retrieved": hits.len(), "top_k": top_k }),
    ));

    let sources: Vec<_> = hits.iter().map(to_source).collect();

    let started = Instant::now();
    let outcome = generate(services, Technique::Hyde, query, &sources).await?;
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
