//! Prompt templates for the technique pipelines.
//!
//! For a fair comparison the final generation prompt is shared across
//! techniques; only the retrieval/context-preparation stages differ. The
//! exceptions (reranking, fusion, subquery) get a preamble explaining how
//! their context was selected, because their score distributions differ
//! enough to confuse the model otherwise.

use crate::model::{SourceChunk, Technique};

pub fn answer_prompt(technique: Technique, context: &str, query: &str) -> String {
    let preamble = match technique {
        Technique::Reranking => {
            "NOTE: the context below was selected by a high-precision \
             cross-encoder reranking stage; its chunks were validated as \
             highly relevant.\n\n"
        }
        Technique::Fusion => {
            "NOTE: the context below was selected by reciprocal rank fusion \
             across multiple query variations. Fusion scores are low by \
             construction; ignore the numeric scores, the chunks are \
             consensus results of several searches.\n\n"
        }
        Technique::Subquery => {
            "NOTE: the context below was collected through several \
             sub-queries covering different aspects of the original \
             question; synthesize the complementary pieces into one \
             coherent answer.\n\n"
        }
        _ => "",
    };

    format!(
        "You are an assistant that answers questions using ONLY the provided context.\n\n\
         {preamble}CONTEXT:\n{context}\n\nQUESTION: {query}\n\n\
         INSTRUCTIONS:\n\
         1. Answer using only the information in the context above.\n\
         2. If the answer is not in the context, say: \"I could not find enough information in the context to answer this question.\"\n\
         3. Be precise and to the point.\n\
         4. Quote relevant passages where appropriate.\n\n\
         ANSWER:"
    )
}

/// Render retrieved chunks into the context block of the answer prompt.
pub fn render_context(sources: &[SourceChunk]) -> String {
    sources
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn hypothesis_prompt(query: &str) -> String {
    format!(
        "Write a detailed hypothetical document that would perfectly answer \
         the following question. Write it as if it came from an authoritative \
         source; do not mention that it is hypothetical.\n\n\
         QUESTION: {query}\n\nDOCUMENT:"
    )
}

pub fn query_variations_prompt(query: &str, count: usize) -> String {
    format!(
        "Generate {count} alternative phrasings of the following search \
         query. Each variation should capture a different angle or \
         vocabulary. Return one variation per line, with no numbering and no \
         extra text.\n\nQUERY: {query}\n\nVARIATIONS:"
    )
}

pub fn decompose_prompt(query: &str, max_subqueries: usize) -> String {
    format!(
        "Decompose the following question into at most {max_subqueries} \
         simpler sub-questions that can each be answered independently. If \
         the question is already simple, return it unchanged. Return one \
         sub-question per line, with no numbering and no extra text.\n\n\
         QUESTION: {query}\n\nSUB-QUESTIONS:"
    )
}

pub fn entities_prompt(query: &str) -> String {
    format!(
        "List the named entities and key domain terms in the following \
         question, one per line, most important first, no extra text. Return \
         at most 5 lines.\n\nQUESTION: {query}\n\nENTITIES:"
    )
}

pub fn agentic_step_prompt(query: &str, context: &str, iteration: usize, max: usize) -> String {
    format!(
        "You are a retrieval agent answering a question with a document \
         index (step {iteration} of {max}).\n\n\
         QUESTION: {query}\n\nCONTEXT GATHERED SO FAR:\n{context}\n\n\
         If the context is sufficient to answer, respond with a line \
         starting with \"ANSWER:\" followed by the answer. Otherwise respond \
         with a single line starting with \"SEARCH:\" followed by a refined \
         search query that would fill the gap. Respond with exactly one of \
         the two."
    )
}

pub fn classify_prompt(query: &str) -> String {
    format!(
        "Classify the following question into exactly one category:\n\
         - factual: a direct question about a single fact\n\
         - ambiguous: vague phrasing or vocabulary unlikely to match documents\n\
         - multi_part: several sub-questions or aspects in one\n\n\
         QUESTION: {query}\n\n\
         Respond with only the category name."
    )
}

pub fn analysis_prompt(summary: &str) -> String {
    format!(
        "You are an expert RAG analyst. The data below compares retrieval \
         techniques run against the same document index.\n\n{summary}\n\n\
         Provide a concise analysis: an executive summary, the best overall \
         technique considering quality/latency trade-offs, per-use-case \
         recommendations (fast queries, high precision, best value), and any \
         anomalies worth attention. Use short bullet points."
    )
}
