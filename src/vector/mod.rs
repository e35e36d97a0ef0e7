//! Vector index abstraction.
//!
//! Retrieval is delegated to a managed vector database; the trait keeps the
//! pipelines testable against an in-memory stand-in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

mod pinecone;

pub use pinecone::PineconeIndex;

/// One indexed chunk with its origin metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub content: String,
    pub document: String,
    pub chunk_index: i64,
    pub page: Option<i64>,
}

/// A retrieval hit: similarity score in [0, 1], higher is better.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,
    pub score: f64,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest neighbours of the embedding, best first.
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, ApiError>;

    /// Upsert chunks with their embeddings; returns the number written.
    async fn upsert(&self, records: Vec<(ChunkRecord, Vec<f32>)>) -> Result<usize, ApiError>;
}
