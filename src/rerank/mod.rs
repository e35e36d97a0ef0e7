//! Cross-encoder reranking, delegated to a managed rerank API.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::errors::ApiError;

/// One rerank result: the index of the input document plus its
/// cross-encoder relevance in [0, 1].
#[derive(Debug, Clone)]
pub struct RerankHit {
    pub index: usize,
    pub relevance_score: f64,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score documents against the query, best first, at most `top_n` hits.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, ApiError>;
}

pub struct CohereReranker {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl CohereReranker {
    pub fn new(client: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url: "https://api.cohere.com".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl Reranker for CohereReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, ApiError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/v2/rerank", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "query": query,
                "documents": documents,
                "top_n": top_n,
            }))
            .send()
            .await
            .map_err(ApiError::upstream)?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(ApiError::upstream)?;

        if !status.is_success() {
            let message = payload["message"]
                .as_str()
                .unwrap_or("rerank request failed")
                .to_string();
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                ApiError::Unavailable(message)
            } else {
                ApiError::Internal(message)
            });
        }

        let hits = payload["results"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| {
                let index = entry["index"].as_u64()? as usize;
                let relevance_score = entry["relevance_score"].as_f64()?.clamp(0.0, 1.0);
                Some(RerankHit {
                    index,
                    relevance_score,
                })
            })
            .collect();

        Ok(hits)
    }
}
