use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// A single-turn generation request. The lab's pipelines all prompt with
/// one rendered template, so a prompt string is the whole conversation.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<i64>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: None,
            max_output_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: i64) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}

/// Token counts as reported by the provider. Absent when the provider did
/// not return usage metadata; never fabricated.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: i64,
    pub output: i64,
    pub total: i64,
}

impl TokenUsage {
    pub fn accumulate(&mut self, other: TokenUsage) {
        self.input += other.input;
        self.output += other.output;
        self.total += other.total;
    }
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// provider name for logs (e.g. "gemini")
    fn name(&self) -> &str;

    /// single-turn completion
    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, ApiError>;

    /// batch embeddings
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}
