//! Agentic RAG: the model drives retrieval.
//!
//! Each iteration the model either refines the search (`SEARCH: ...`) or
//! commits to an answer (`ANSWER: ...`). The loop is bounded; if the model
//! never commits, the accumulated context is forced through the shared
//! answer prompt.

use std::time::Instant;

use serde_json::json;

use crate::core::errors::ApiError;
use crate::llm::{prompts, ChatRequest};
use crate::model::Technique;
use crate::rag::pipeline::{
    dedupe_best, generate, merge_usage, search, step, to_source, RagServices, TechniqueRun,
};

const MAX_ITERATIONS: usize = 3;

pub async fn run(
    services: &RagServices,
    query: &str,
    top_k: usize,
) -> Result<TechniqueRun, ApiError> {
    let mut steps = Vec::new();
    let mut usage = None;
    let mut gathered = Vec::new();
    let mut total_retrieved = 0usize;
    let mut answer: Option<String> = None;

    // Seed the context with one direct retrieval round.
    let started = Instant::now();
    let seed_hits = search(services, query, top_k).await?;
    total_retrieved += seed_hits.len();
    gathered.extend(seed_hits);
    steps.push(step(
        "seed_search",
        started,
        json!({ "chunks_retrieved": total_retrieved, "top_k": top_k }),
    ));

    for iteration in 1..=MAX_ITERATIONS {
        let context: String = gathered
            .iter()
            .map(|hit| hit.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let started = Instant::now();
        let reply = services
            .llm
            .chat(
                ChatRequest::new(prompts::agentic_step_prompt(
                    query,
                    &context,
                    iteration,
                    MAX_ITERATIONS,
                ))
                .with_temperature(services.temperature)
                .with_max_output_tokens(services.max_output_tokens),
            )
            .await?;
        merge_usage(&mut usage, reply.usage);

        let text = reply.text.trim().to_string();
        if let Some(rest) = text.strip_prefix("ANSWER:") {
            answer = Some(rest.trim().to_string());
            steps.push(step("agent_answer", started, json!({ "iteration": iteration })));
            break;
        }
        if let Some(rest) = text.strip_prefix("SEARCH:") {
            let refined = rest.trim();
            let hits = search(services, refined, top_k).await?;
            total_retrieved += hits.len();
            gathered.extend(hits);
            gathered = dedupe_best(gathered);
            steps.push(step(
                "agent_search",
                started,
                json!({ "iteration": iteration, "refined_query": refined }),
            ));
            continue;
        }

        // The model ignored the protocol; take its text as the answer.
        answer = Some(text);
        steps.push(step(
            "agent_freeform_answer",
            started,
            json!({ "iteration": iteration }),
        ));
        break;
    }

    let sources: Vec<_> = gathered.iter().map(to_source).collect();

    let answer = match answer {
        Some(answer) if !answer.is_empty() => answer,
        _ => {
            let started = Instant::now();
            let outcome = generate(services, Technique::Agentic, query, &sources).await?;
            merge_usage(&mut usage, outcome.usage);
            steps.push(step("forced_generation", started, json!({})));
            outcome.text
        }
    };

    Ok(TechniqueRun {
        answer,
        chunks_retrieved: total_retrieved as i64,
        sources,
        steps,
        usage,
    })
}
