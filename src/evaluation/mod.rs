//! LLM-judge quality scoring.
//!
//! One judge call per metric, each returning a score in [0, 1]. A failed or
//! unparseable judge call leaves that metric unknown for the execution;
//! evaluation never fails a query.

use std::sync::Arc;

use crate::llm::{ChatRequest, LlmProvider};

#[derive(Debug, Clone, Copy, Default)]
pub struct QualityScores {
    pub faithfulness: Option<f64>,
    pub answer_relevancy: Option<f64>,
    pub context_precision: Option<f64>,
    pub context_recall: Option<f64>,
}

#[derive(Clone)]
pub struct QualityEvaluator {
    llm: Arc<dyn LlmProvider>,
}

impl QualityEvaluator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn evaluate(&self, query: &str, answer: &str, contexts: &[String]) -> QualityScores {
        let context_block = contexts.join("\n\n");

        QualityScores {
            faithfulness: self
                .judge(&format!(
                    "Rate from 0.0 to 1.0 how faithful the answer is to the \
                     context, i.e. whether every claim in the answer is \
                     supported by the context.\n\nCONTEXT:\n{context_block}\n\n\
                     ANSWER: {answer}\n\nRespond with only the number."
                ))
                .await,
            answer_relevancy: self
                .judge(&format!(
                    "Rate from 0.0 to 1.0 how relevant the answer is to the \
                     question.\n\nQUESTION: {query}\n\nANSWER: {answer}\n\n\
                     Respond with only the number."
                ))
                .await,
            context_precision: self
                .judge(&format!(
                    "Rate from 0.0 to 1.0 what fraction of the retrieved \
                     context is actually relevant to the question.\n\n\
                     QUESTION: {query}\n\nCONTEXT:\n{context_block}\n\n\
                     Respond with only the number."
                ))
                .await,
            context_recall: self
                .judge(&format!(
                    "Rate from 0.0 to 1.0 how much of the information needed \
                     to answer the question is present in the retrieved \
                     context.\n\nQUESTION: {query}\n\nCONTEXT:\n{context_block}\n\n\
                     Respond with only the number."
                ))
                .await,
        }
    }

    async fn judge(&self, prompt: &str) -> Option<f64> {
        let outcome = self
            .llm
            .chat(
                ChatRequest::new(prompt.to_string())
                    .with_temperature(0.0)
                    .with_max_output_tokens(10),
            )
            .await;

        match outcome {
            Ok(outcome) => match parse_score(&outcome.text) {
                Some(score) => Some(score),
                None => {
                    tracing::warn!("judge returned no parseable score: {:?}", outcome.text);
                    None
                }
            },
            Err(err) => {
                tracing::warn!("judge call failed: {}", err);
                None
            }
        }
    }
}

/// First float in the reply, clamped to [0, 1].
fn parse_score(text: &str) -> Option<f64> {
    text.split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_ascii_digit() && c != '.' && c != '-'))
        .find_map(|token| token.parse::<f64>().ok())
        .filter(|score| score.is_finite())
        .map(|score| score.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_bare_number() {
        assert_eq!(parse_score("0.85"), Some(0.85));
    }

    #[test]
    fn parses_a_number_with_prose() {
        assert_eq!(parse_score("Score: 0.7 (mostly faithful)"), Some(0.7));
    }

    #[test]
    fn clamps_out_of_range_scores() {
        assert_eq!(parse_score("1.4"), Some(1.0));
        assert_eq!(parse_score("-0.2"), Some(0.0));
    }

    #[test]
    fn zero_is_a_valid_score() {
        assert_eq!(parse_score("0.0"), Some(0.0));
    }

    #[test]
    fn no_number_means_unknown() {
        assert_eq!(parse_score("cannot judge this"), None);
    }
}
