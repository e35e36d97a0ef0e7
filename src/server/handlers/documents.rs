//! Document ingestion: split, embed, upsert to the vector index.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::rag::splitter::split_into_chunks;
use crate::state::AppState;
use crate::vector::ChunkRecord;

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub text: String,
    pub document: Option<String>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
}

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.text.trim().is_empty() {
        return Err(ApiError::Validation("text must not be empty".to_string()));
    }

    let document = payload
        .document
        .unwrap_or_else(|| "uploaded".to_string());
    let chunk_size = payload.chunk_size.unwrap_or(state.settings.chunk_size);
    let chunk_overlap = payload.chunk_overlap.unwrap_or(state.settings.chunk_overlap);
    if chunk_overlap >= chunk_size {
        return Err(ApiError::Validation(
            "chunk_overlap must be smaller than chunk_size".to_string(),
        ));
    }

    let chunks = split_into_chunks(&payload.text, chunk_size, chunk_overlap);
    if chunks.is_empty() {
        return Err(ApiError::Validation(
            "no chunks produced from text".to_string(),
        ));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = state.services.llm.embed(&texts).await?;

    let records: Vec<(ChunkRecord, Vec<f32>)> = chunks
        .iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| {
            (
                ChunkRecord {
                    id: Uuid::new_v4().to_string(),
                    content: chunk.text.clone(),
                    document: document.clone(),
                    chunk_index: chunk.chunk_index,
                    page: None,
                },
                embedding,
            )
        })
        .collect();

    let indexed = state.services.index.upsert(records).await?;
    tracing::info!("indexed {} chunks from '{}'", indexed, document);

    Ok(Json(json!({
        "success": true,
        "document": document,
        "chunks_indexed": indexed,
    })))
}
