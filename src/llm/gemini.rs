//! Gemini over the generative language REST API.
//!
//! Generation and embeddings are both delegated here; the lab owns no model
//! inference of its own.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::provider::{ChatOutcome, ChatRequest, LlmProvider, TokenUsage};
use crate::core::errors::ApiError;

pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: String,
}

impl GeminiProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        model: String,
        embedding_model: String,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            embedding_model,
        }
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn embed_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:batchEmbedContents",
            self.base_url, self.embedding_model
        )
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, ApiError> {
        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = request.temperature {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_output_tokens) = request.max_output_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_output_tokens));
        }

        let body = json!({
            "contents": [{ "parts": [{ "text": request.prompt }] }],
            "generationConfig": Value::Object(generation_config),
        });

        let response = self
            .client
            .post(self.generate_url())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(ApiError::upstream)?;

        if !status.is_success() {
            let message = payload["error"]["message"]
                .as_str()
                .unwrap_or("generation request failed")
                .to_string();
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                ApiError::Unavailable(message)
            } else {
                ApiError::Internal(message)
            });
        }

        let text = payload["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage = payload.get("usageMetadata").map(|meta| TokenUsage {
            input: meta["promptTokenCount"].as_i64().unwrap_or(0),
            output: meta["candidatesTokenCount"].as_i64().unwrap_or(0),
            total: meta["totalTokenCount"].as_i64().unwrap_or(0),
        });

        Ok(ChatOutcome { text, usage })
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<Value> = inputs
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", self.embedding_model),
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();

        let response = self
            .client
            .post(self.embed_url())
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(ApiError::upstream)?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(ApiError::upstream)?;

        if !status.is_success() {
            let message = payload["error"]["message"]
                .as_str()
                .unwrap_or("embedding request failed")
                .to_string();
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                ApiError::Unavailable(message)
            } else {
                ApiError::Internal(message)
            });
        }

        let embeddings = payload["embeddings"]
            .as_array()
            .ok_or_else(|| ApiError::Internal("embedding response missing values".to_string()))?
            .iter()
            .map(|entry| {
                entry["values"]
                    .as_array()
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|v| v.as_f64())
                            .map(|v| v as f32)
                            .collect::<Vec<f32>>()
                    })
                    .ok_or_else(|| {
                        ApiError::Internal("embedding entry missing values".to_string())
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if embeddings.len() != inputs.len() {
            return Err(ApiError::Internal(format!(
                "embedding count mismatch: {} != {}",
                embeddings.len(),
                inputs.len()
            )));
        }

        Ok(embeddings)
    }
}
