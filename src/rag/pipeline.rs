//! Pipeline plumbing shared by all techniques.
//!
//! A technique run is a short sequence of delegated calls (embed, search,
//! optionally rerank/expand, generate). Everything here is stateless; the
//! HTTP layer times the run, derives cost, and hands the result to the
//! recorder.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::try_join_all;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::llm::{ChatOutcome, ChatRequest, LlmProvider, TokenUsage};
use crate::model::{SourceChunk, Technique};
use crate::rag::techniques;
use crate::rerank::Reranker;
use crate::vector::{ScoredChunk, VectorIndex};

/// Handles to the external collaborators, passed into every pipeline.
#[derive(Clone)]
pub struct RagServices {
    pub llm: Arc<dyn LlmProvider>,
    pub index: Arc<dyn VectorIndex>,
    pub reranker: Arc<dyn Reranker>,
    pub temperature: f64,
    pub max_output_tokens: i64,
}

/// What a technique produces before recording: the answer, the sources in
/// retrieval order, a step trace, and accumulated token usage.
#[derive(Debug, Clone)]
pub struct TechniqueRun {
    pub answer: String,
    pub sources: Vec<SourceChunk>,
    pub steps: Vec<Value>,
    pub usage: Option<TokenUsage>,
    pub chunks_retrieved: i64,
}

pub async fn run(
    services: &RagServices,
    technique: Technique,
    query: &str,
    top_k: usize,
) -> Result<TechniqueRun, ApiError> {
    match technique {
        Technique::Baseline => techniques::baseline::run(services, query, top_k).await,
        Technique::Hyde => techniques::hyde::run(services, query, top_k).await,
        Technique::Reranking => techniques::reranking::run(services, query, top_k).await,
        Technique::Fusion => techniques::fusion::run(services, query, top_k).await,
        Technique::Subquery => techniques::subquery::run(services, query, top_k).await,
        Technique::Graph => techniques::graph::run(services, query, top_k).await,
        Technique::Agentic => techniques::agentic::run(services, query, top_k).await,
        Technique::Adaptive => techniques::adaptive::run(services, query, top_k).await,
    }
}

/// Embed a text and fetch its nearest chunks.
pub(crate) async fn search(
    services: &RagServices,
    text: &str,
    top_k: usize,
) -> Result<Vec<ScoredChunk>, ApiError> {
    let embeddings = services.llm.embed(&[text.to_string()]).await?;
    let embedding = embeddings
        .first()
        .ok_or_else(|| ApiError::Internal("embedding provider returned nothing".to_string()))?;
    services.index.query(embedding, top_k).await
}

/// One search per query, issued concurrently; result lists keep the query
/// order.
pub(crate) async fn search_many(
    services: &RagServices,
    queries: &[String],
    top_k: usize,
) -> Result<Vec<Vec<ScoredChunk>>, ApiError> {
    try_join_all(queries.iter().map(|query| search(services, query, top_k))).await
}

pub(crate) fn to_source(hit: &ScoredChunk) -> SourceChunk {
    SourceChunk {
        content: hit.chunk.content.clone(),
        score: hit.score,
        document: hit.chunk.document.clone(),
        chunk_index: hit.chunk.chunk_index,
        page: hit.chunk.page,
        pre_rerank_score: None,
    }
}

/// Render the shared answer prompt and generate.
pub(crate) async fn generate(
    services: &RagServices,
    technique: Technique,
    query: &str,
    sources: &[SourceChunk],
) -> Result<ChatOutcome, ApiError> {
    let context = crate::llm::prompts::render_context(sources);
    let prompt = crate::llm::prompts::answer_prompt(technique, &context, query);
    services
        .llm
        .chat(
            ChatRequest::new(prompt)
                .with_temperature(services.temperature)
                .with_max_output_tokens(services.max_output_tokens),
        )
        .await
}

pub(crate) fn step(name: &str, started: Instant, mut extra: Value) -> Value {
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    if let Value::Object(map) = &mut extra {
        map.insert("step".to_string(), json!(name));
        map.insert("duration_ms".to_string(), json!(duration_ms));
        extra
    } else {
        json!({ "step": name, "duration_ms": duration_ms })
    }
}

pub(crate) fn merge_usage(total: &mut Option<TokenUsage>, new: Option<TokenUsage>) {
    if let Some(new) = new {
        match total {
            Some(existing) => existing.accumulate(new),
            None => *total = Some(new),
        }
    }
}

/// Non-empty trimmed lines from an LLM list response.
pub(crate) fn parse_lines(text: &str, max: usize) -> Vec<String> {
    text.lines()
        .map(|line| line.trim().trim_start_matches(['-', '*']).trim())
        .filter(|line| !line.is_empty())
        .take(max)
        .map(|line| line.to_string())
        .collect()
}

/// Merge retrieval hits keeping the best score per chunk id, preserving
/// first-appearance order.
pub(crate) fn dedupe_best(hits: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    let mut merged: Vec<ScoredChunk> = Vec::new();
    for hit in hits {
        match merged.iter_mut().find(|m| m.chunk.id == hit.chunk.id) {
            Some(existing) => {
                if hit.score > existing.score {
                    existing.score = hit.score;
                }
            }
            None => merged.push(hit),
        }
    }
    merged
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::rerank::RerankHit;
    use crate::vector::ChunkRecord;

    /// Scripted LLM: pops a queued reply per chat call, falls back to a
    /// canned answer when the script runs dry.
    pub struct StubLlm {
        pub replies: Mutex<VecDeque<String>>,
        pub chat_calls: Mutex<usize>,
    }

    impl StubLlm {
        pub fn scripted(replies: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().map(String::from).collect()),
                chat_calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn name(&self) -> &str {
            "stub"
        }

        async fn chat(&self, _request: ChatRequest) -> Result<ChatOutcome, ApiError> {
            *self.chat_calls.lock().unwrap() += 1;
            let text = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "stub answer".to_string());
            Ok(ChatOutcome {
                text,
                usage: Some(TokenUsage {
                    input: 10,
                    output: 5,
                    total: 15,
                }),
            })
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
    }

    pub struct StubIndex {
        pub hits: Vec<ScoredChunk>,
    }

    impl StubIndex {
        pub fn with_scores(scores: &[f64]) -> Arc<Self> {
            let hits = scores
                .iter()
                .enumerate()
                .map(|(i, &score)| ScoredChunk {
                    chunk: ChunkRecord {
                        id: format!("chunk-{}", i),
                        content: format!("content {}", i),
                        document: "doc.md".to_string(),
                        chunk_index: i as i64,
                        page: None,
                    },
                    score,
                })
                .collect();
            Arc::new(Self { hits })
        }
    }

    #[async_trait]
    impl VectorIndex for StubIndex {
        async fn query(
            &self,
            _embedding: &[f32],
            top_k: usize,
        ) -> Result<Vec<ScoredChunk>, ApiError> {
            Ok(self.hits.iter().take(top_k).cloned().collect())
        }

        async fn upsert(&self, records: Vec<(ChunkRecord, Vec<f32>)>) -> Result<usize, ApiError> {
            Ok(records.len())
        }
    }

    /// Reverses the candidate order with high scores, making rerank effects
    /// observable.
    pub struct StubReranker;

    #[async_trait]
    impl Reranker for StubReranker {
        async fn rerank(
            &self,
            _query: &str,
            documents: &[String],
            top_n: usize,
        ) -> Result<Vec<RerankHit>, ApiError> {
            Ok((0..documents.len())
                .rev()
                .take(top_n)
                .enumerate()
                .map(|(rank, index)| RerankHit {
                    index,
                    relevance_score: 0.99 - rank as f64 * 0.01,
                })
                .collect())
        }
    }

    pub fn services(llm: Arc<StubLlm>, index: Arc<StubIndex>) -> RagServices {
        RagServices {
            llm,
            index,
            reranker: Arc::new(StubReranker),
            temperature: 0.7,
            max_output_tokens: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn baseline_retrieves_then_generates() {
        let llm = StubLlm::scripted(vec!["grounded answer"]);
        let services = services(llm.clone(), StubIndex::with_scores(&[0.9, 0.8, 0.7]));

        let run = run(&services, Technique::Baseline, "what is rag?", 2)
            .await
            .unwrap();
        assert_eq!(run.answer, "grounded answer");
        assert_eq!(run.sources.len(), 2);
        assert_eq!(run.chunks_retrieved, 2);
        assert_eq!(run.usage.unwrap().total, 15);
        assert_eq!(*llm.chat_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn reranking_keeps_pre_rerank_scores_and_rerank_order() {
        let llm = StubLlm::scripted(vec!["answer"]);
        let services = services(
            llm,
            StubIndex::with_scores(&[0.9, 0.8, 0.7, 0.6, 0.5, 0.4]),
        );

        let run = run(&services, Technique::Reranking, "q", 2).await.unwrap();
        assert_eq!(run.sources.len(), 2);
        // The stub reranker reverses: the last over-retrieved hit wins.
        assert_eq!(run.sources[0].content, "content 5");
        assert_eq!(run.sources[0].score, 0.99);
        assert_eq!(run.sources[0].pre_rerank_score, Some(0.4));
        assert!(run.chunks_retrieved >= run.sources.len() as i64);
    }

    #[tokio::test]
    async fn hyde_searches_with_the_hypothesis() {
        let llm = StubLlm::scripted(vec!["a hypothetical document", "final answer"]);
        let services = services(llm.clone(), StubIndex::with_scores(&[0.9]));

        let run = run(&services, Technique::Hyde, "q", 1).await.unwrap();
        assert_eq!(run.answer, "final answer");
        // Two chat calls: hypothesis then generation.
        assert_eq!(*llm.chat_calls.lock().unwrap(), 2);
        let usage = run.usage.unwrap();
        assert_eq!(usage.total, 30);
    }

    #[tokio::test]
    async fn agentic_stops_on_answer_reply() {
        let llm = StubLlm::scripted(vec![
            "SEARCH: more specific query",
            "ANSWER: found it",
        ]);
        let services = services(llm.clone(), StubIndex::with_scores(&[0.8, 0.7]));

        let run = run(&services, Technique::Agentic, "q", 2).await.unwrap();
        assert_eq!(run.answer, "found it");
        assert_eq!(*llm.chat_calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn agentic_is_bounded_when_the_model_never_answers() {
        let llm = StubLlm::scripted(vec![
            "SEARCH: a", "SEARCH: b", "SEARCH: c", "SEARCH: d", "SEARCH: e",
        ]);
        let services = services(llm.clone(), StubIndex::with_scores(&[0.8]));

        let run = run(&services, Technique::Agentic, "q", 1).await.unwrap();
        // Loop capped, then one forced generation call.
        assert!(!run.answer.is_empty());
        assert!(*llm.chat_calls.lock().unwrap() <= 4);
    }

    #[tokio::test]
    async fn adaptive_routes_multi_part_to_subquery() {
        let llm = StubLlm::scripted(vec![
            "multi_part",
            "what is x\nwhat is y",
            "combined answer",
        ]);
        let services = services(llm, StubIndex::with_scores(&[0.9, 0.8]));

        let run = run(&services, Technique::Adaptive, "what are x and y?", 2)
            .await
            .unwrap();
        assert_eq!(run.answer, "combined answer");
        assert_eq!(run.steps[0]["step"], "classify_query");
        assert_eq!(run.steps[0]["route"], "subquery");
    }

    #[test]
    fn dedupe_best_keeps_highest_score_per_chunk() {
        let mut hits = Vec::new();
        for (id, score) in [("a", 0.5), ("b", 0.9), ("a", 0.8)] {
            hits.push(ScoredChunk {
                chunk: crate::vector::ChunkRecord {
                    id: id.to_string(),
                    content: String::new(),
                    document: String::new(),
                    chunk_index: 0,
                    page: None,
                },
                score,
            });
        }
        let merged = dedupe_best(hits);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].chunk.id, "a");
        assert_eq!(merged[0].score, 0.8);
    }

    #[test]
    fn parse_lines_strips_bullets_and_blanks() {
        let lines = parse_lines("- first\n\n* second\n  third  \n", 2);
        assert_eq!(lines, vec!["first", "second"]);
    }
}
