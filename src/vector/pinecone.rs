//! Pinecone serverless index over its REST API.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ChunkRecord, ScoredChunk, VectorIndex};
use crate::core::errors::ApiError;

pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
    namespace: String,
}

impl PineconeIndex {
    pub fn new(
        client: reqwest::Client,
        host: String,
        api_key: String,
        namespace: String,
    ) -> Self {
        Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key,
            namespace,
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        let response = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(ApiError::upstream)?;

        if !status.is_success() {
            let message = payload["message"]
                .as_str()
                .unwrap_or("vector index request failed")
                .to_string();
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                ApiError::Unavailable(message)
            } else {
                ApiError::Internal(message)
            });
        }
        Ok(payload)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, ApiError> {
        let payload = self
            .post(
                "/query",
                json!({
                    "vector": embedding,
                    "topK": top_k,
                    "includeMetadata": true,
                    "namespace": self.namespace,
                }),
            )
            .await?;

        let matches = payload["matches"].as_array().cloned().unwrap_or_default();
        let mut hits = Vec::with_capacity(matches.len());
        for entry in matches {
            let metadata = &entry["metadata"];
            hits.push(ScoredChunk {
                chunk: ChunkRecord {
                    id: entry["id"].as_str().unwrap_or_default().to_string(),
                    content: metadata["content"].as_str().unwrap_or_default().to_string(),
                    document: metadata["document"]
                        .as_str()
                        .unwrap_or("unknown")
                        .to_string(),
                    chunk_index: metadata["chunk_index"].as_i64().unwrap_or(0),
                    page: metadata["page"].as_i64(),
                },
                score: entry["score"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0),
            });
        }
        Ok(hits)
    }

    async fn upsert(&self, records: Vec<(ChunkRecord, Vec<f32>)>) -> Result<usize, ApiError> {
        if records.is_empty() {
            return Ok(0);
        }

        let vectors: Vec<Value> = records
            .iter()
            .map(|(chunk, embedding)| {
                json!({
                    "id": chunk.id,
                    "values": embedding,
                    "metadata": {
                        "content": chunk.content,
                        "document": chunk.document,
                        "chunk_index": chunk.chunk_index,
                        "page": chunk.page,
                    },
                })
            })
            .collect();

        let count = vectors.len();
        self.post(
            "/vectors/upsert",
            json!({ "vectors": vectors, "namespace": self.namespace }),
        )
        .await?;
        Ok(count)
    }
}
