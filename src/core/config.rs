//! Environment-driven configuration.
//!
//! Every external collaborator (Gemini, Pinecone, Cohere) is addressed
//! through these settings; handlers receive them via `AppState` instead of
//! reading the environment ad hoc.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Filesystem locations for the backend's data and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = env::var("RAGLAB_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let log_dir = data_dir.join("logs");
        let db_path = data_dir.join("raglab.db");
        Self {
            data_dir,
            log_dir,
            db_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,

    // Gemini
    pub google_api_key: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub embedding_model: String,

    // Pinecone
    pub pinecone_api_key: String,
    pub pinecone_index_host: String,
    pub pinecone_namespace: String,

    // Cohere
    pub cohere_api_key: String,
    pub rerank_model: String,

    // Retrieval / generation defaults
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub temperature: f64,
    pub max_output_tokens: i64,

    // USD per million tokens, used to derive per-execution cost
    pub price_per_mtok_input: f64,
    pub price_per_mtok_output: f64,

    pub feed_interval: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        let cors = env_or(
            "CORS_ORIGINS",
            "http://localhost:5173,http://localhost:3000",
        );
        Self {
            host: env_or("HOST", "127.0.0.1"),
            port: parse_or("PORT", 8000),
            cors_origins: cors.split(',').map(|s| s.trim().to_string()).collect(),

            google_api_key: env_or("GOOGLE_API_KEY", ""),
            gemini_base_url: env_or(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com",
            ),
            gemini_model: env_or("GEMINI_MODEL", "gemini-2.0-flash"),
            embedding_model: env_or("EMBEDDING_MODEL", "text-embedding-004"),

            pinecone_api_key: env_or("PINECONE_API_KEY", ""),
            pinecone_index_host: env_or("PINECONE_INDEX_HOST", ""),
            pinecone_namespace: env_or("PINECONE_NAMESPACE", "rag-docs"),

            cohere_api_key: env_or("COHERE_API_KEY", ""),
            rerank_model: env_or("RERANK_MODEL", "rerank-v3.5"),

            top_k: parse_or("TOP_K", 5),
            chunk_size: parse_or("CHUNK_SIZE", 1000),
            chunk_overlap: parse_or("CHUNK_OVERLAP", 200),
            temperature: parse_or("TEMPERATURE", 0.7),
            max_output_tokens: parse_or("MAX_OUTPUT_TOKENS", 500),

            price_per_mtok_input: parse_or("PRICE_PER_MTOK_INPUT", 0.10),
            price_per_mtok_output: parse_or("PRICE_PER_MTOK_OUTPUT", 0.40),

            feed_interval: Duration::from_secs(parse_or("FEED_INTERVAL_SECS", 5)),
        }
    }

    /// Warn once at startup about missing provider credentials; the server
    /// still boots so the persisted data and dashboards stay reachable.
    pub fn warn_missing_keys(&self) {
        for (name, value) in [
            ("GOOGLE_API_KEY", &self.google_api_key),
            ("PINECONE_API_KEY", &self.pinecone_api_key),
            ("COHERE_API_KEY", &self.cohere_api_key),
        ] {
            if value.is_empty() {
                tracing::warn!("{} is not set; dependent pipelines will fail", name);
            }
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
