//! Adaptive RAG: classify the query, then route to the fitting pipeline.
//!
//! factual -> baseline, ambiguous -> hyde, multi_part -> subquery.
//! Unrecognized classifications fall back to baseline.

use std::time::Instant;

use serde_json::json;

use crate::core::errors::ApiError;
use crate::llm::{prompts, ChatRequest};
use crate::rag::pipeline::{merge_usage, step, RagServices, TechniqueRun};
use crate::rag::techniques::{baseline, hyde, subquery};

pub async fn run(
    services: &RagServices,
    query: &str,
    top_k: usize,
) -> Result<TechniqueRun, ApiError> {
    let started = Instant::now();
    let classify_outcome = services
        .llm
        .chat(
            ChatRequest::new(prompts::classify_prompt(query))
                .with_temperature(0.0)
                .with_max_output_tokens(10),
        )
        .await?;

    let classification = classify_outcome.text.trim().to_lowercase();
    let route = match classification.as_str() {
        "ambiguous" => "hyde",
        "multi_part" => "subquery",
        _ => "baseline",
    };
    let classify_step = step(
        "classify_query",
        started,
        json!({ "classification": classification, "route": route }),
    );

    let mut run = match route {
        "hyde" => hyde::run(services, query, top_k).await?,
        "subquery" => subquery::run(services, query, top_k).await?,
        _ => baseline::run(services, query, top_k).await?,
    };

    merge_usage(&mut run.usage, classify_outcome.usage);
    run.steps.insert(0, classify_step);
    Ok(run)
}
