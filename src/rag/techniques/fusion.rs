//! RAG fusion: multi-query retrieval merged with reciprocal rank fusion.
//!
//! RRF: score(doc) = sum over lists of 1 / (k + rank), k = 60. The fused
//! ordering decides which chunks survive; each surviving source keeps its
//! best vector score so recorded relevance stays in [0, 1].

use std::time::Instant;

use serde_json::json;

use crate::core::errors::ApiError;
use crate::llm::{prompts, ChatRequest};
use crate::model::Technique;
use crate::rag::pipeline::{generate, merge_usage, parse_lines, search_many, step, to_source, RagServices, TechniqueRun};
use crate::vector::ScoredChunk;

const NUM_VARIATIONS: usize = 3;
const RRF_K: f64 = 60.0;

pub async fn run(
    services: &RagServices,
    query: &str,
    top_k: usize,
) -> Result<TechniqueRun, ApiError> {
    let mut steps = Vec::new();
    let mut usage = None;

    let started = Instant::now();
    let variations_outcome = services
        .llm
        .chat(
            ChatRequest::new(prompts::query_variations_prompt(query, NUM_VARIATIONS))
                .with_temperature(services.temperature)
                .with_max_output_tokens(200),
        )
        .await?;
    merge_usage(&mut usage, variations_outcome.usage);

    let mut queries = vec![query.to_string()];
    queries.extend(parse_lines(&variations_outcome.text, NUM_VARIATIONS));
    steps.push(step(
        "generate_query_variations",
        started,
        json!({ "num_queries": queries.len() }),
    ));

    let started = Instant::now();
    let result_lists = search_many(services, &queries, top_k * 2).await?;
    let total_retrieved: usize = result_lists.iter().map(|hits| hits.len()).sum();
    steps.push(step(
        "multi_query_search",
        started,
        json!({ "num_queries": queries.len(), "total_retrieved": total_retrieved }),
    ));

    let started = Instant::now();
    let fused = reciprocal_rank_fusion(&result_lists, RRF_K, top_k);
    steps.push(step(
        "reciprocal_rank_fusion",
        started,
        json!({ "rrf_k": RRF_K, "fused": fused.len() }),
    ));

    let sources: Vec<_> = fused.iter().map(|(hit, _)| to_source(hit)).collect();

    let started = Instant::now();
    let outcome = generate(services, Technique::Fusion, query, &sources).await?;
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

/// Fuse ranked result lists. Each returned chunk carries the best vector
/// score it appeared with; the pair's second element is its RRF score and
/// the vector order is fused rank.
pub(crate) fn reciprocal_rank_fusion(
    result_lists: &[Vec<ScoredChunk>],
    k: f64,
    final_top_k: usize,
) -> Vec<(ScoredChunk, f64)> {
    let mut fused: Vec<(ScoredChunk, f64)> = Vec::new();

    for list in result_lists {
        for (rank, hit) in list.iter().enumerate() {
            let contribution = 1.0 / (k + rank as f64 + 1.0);
            match fused.iter_mut().find(|(c, _)| c.chunk.id == hit.chunk.id) {
                Some((existing, rrf)) => {
                    *rrf += contribution;
                    if hit.score > existing.score {
                        existing.score = hit.score;
                    }
                }
                None => fused.push((hit.clone(), contribution)),
            }
        }
    }

    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused.truncate(final_top_k);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::ChunkRecord;

    fn hit(id: &str, score: f64) -> ScoredChunk {
        ScoredChunk {
            chunk: ChunkRecord {
                id: id.to_string(),
                content: format!("content {}", id),
                document: "doc.md".to_string(),
                chunk_index: 0,
                page: None,
            },
            score,
        }
    }

    #[test]
    fn doc_in_every_list_outranks_single_list_toppers() {
        let lists = vec![
            vec![hit("a", 0.9), hit("shared", 0.8)],
            vec![hit("shared", 0.7), hit("b", 0.6)],
            vec![hit("shared", 0.5), hit("c", 0.4)],
        ];
        let fused = reciprocal_rank_fusion(&lists, 60.0, 4);
        assert_eq!(fused[0].0.chunk.id, "shared");
        // Best vector score across appearances is kept.
        assert_eq!(fused[0].0.score, 0.8);
    }

    #[test]
    fn rrf_scores_follow_the_formula() {
        let lists = vec![vec![hit("a", 0.9)], vec![hit("a", 0.8)]];
        let fused = reciprocal_rank_fusion(&lists, 60.0, 1);
        let expected = 2.0 / 61.0;
        assert!((fused[0].1 - expected).abs() < 1e-12);
    }

    #[test]
    fn truncates_to_final_top_k() {
        let lists = vec![vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.7)]];
        let fused = reciprocal_rank_fusion(&lists, 60.0, 2);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].0.chunk.id, "a");
    }
}
