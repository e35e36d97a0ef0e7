use std::sync::Arc;
use std::time::Duration;

use crate::analytics::feed::ComparisonFeed;
use crate::core::config::{AppPaths, Settings};
use crate::evaluation::QualityEvaluator;
use crate::llm::{GeminiProvider, LlmProvider};
use crate::rag::RagServices;
use crate::rerank::{CohereReranker, Reranker};
use crate::store::{AnalysisStore, ExecutionStore};
use crate::vector::{PineconeIndex, VectorIndex};

/// Global application state shared across all routes and background tasks.
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub paths: Arc<AppPaths>,
    pub executions: ExecutionStore,
    pub analyses: AnalysisStore,
    pub services: RagServices,
    pub evaluator: QualityEvaluator,
    pub feed: Arc<ComparisonFeed>,
}

impl AppState {
    /// Initializes the application state: configuration, the SQLite stores,
    /// the external service clients, and the background comparison feed.
    pub async fn initialize() -> anyhow::Result<Arc<Self>> {
        let settings = Settings::from_env();
        let paths = Arc::new(AppPaths::new());

        let pool = crate::store::open_pool(&paths.db_path).await?;
        let executions = ExecutionStore::new(pool.clone()).await?;
        let analyses = AnalysisStore::new(pool).await?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        let llm: Arc<dyn LlmProvider> = Arc::new(GeminiProvider::new(
            client.clone(),
            settings.gemini_base_url.clone(),
            settings.google_api_key.clone(),
            settings.gemini_model.clone(),
            settings.embedding_model.clone(),
        ));
        let index: Arc<dyn VectorIndex> = Arc::new(PineconeIndex::new(
            client.clone(),
            settings.pinecone_index_host.clone(),
            settings.pinecone_api_key.clone(),
            settings.pinecone_namespace.clone(),
        ));
        let reranker: Arc<dyn Reranker> = Arc::new(CohereReranker::new(
            client,
            settings.cohere_api_key.clone(),
            settings.rerank_model.clone(),
        ));

        let services = RagServices {
            llm: llm.clone(),
            index,
            reranker,
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        };

        let evaluator = QualityEvaluator::new(llm);
        let feed = Arc::new(ComparisonFeed::spawn(
            executions.clone(),
            settings.feed_interval,
        ));

        settings.warn_missing_keys();

        Ok(Arc::new(Self {
            settings,
            paths,
            executions,
            analyses,
            services,
            evaluator,
            feed,
        }))
    }
}
