//! The execution recorder: one durable row per query run.
//!
//! Executions are append-only. The listing order (`created_at` descending,
//! then id descending) is a contract; "latest execution" views depend on it.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::core::errors::ApiError;
use crate::model::{Execution, ExecutionFilter, ExecutionMetrics, NewExecution, Technique};

#[derive(Clone)]
pub struct ExecutionStore {
    pool: SqlitePool,
}

impl ExecutionStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query TEXT NOT NULL,
                technique TEXT NOT NULL,
                answer TEXT NOT NULL,
                sources TEXT NOT NULL DEFAULT '[]',
                steps TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS execution_metrics (
                execution_id INTEGER PRIMARY KEY
                    REFERENCES executions(id) ON DELETE CASCADE,
                latency_ms REAL NOT NULL,
                tokens_input INTEGER,
                tokens_output INTEGER,
                tokens_total INTEGER,
                cost_usd REAL,
                chunks_retrieved INTEGER,
                chunks_used INTEGER,
                faithfulness REAL,
                answer_relevancy REAL,
                context_precision REAL,
                context_recall REAL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_executions_technique_created
             ON executions(technique, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_executions_created
             ON executions(created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(())
    }

    /// Append one execution. The id and timestamp are assigned here; the
    /// returned id is monotonically increasing.
    pub async fn record(&self, new: NewExecution) -> Result<i64, ApiError> {
        self.record_at(new, Utc::now()).await
    }

    pub(crate) async fn record_at(
        &self,
        new: NewExecution,
        created_at: DateTime<Utc>,
    ) -> Result<i64, ApiError> {
        if new.query.trim().is_empty() {
            return Err(ApiError::Validation("query must not be empty".to_string()));
        }

        let sources_json = serde_json::to_string(&new.sources).map_err(ApiError::internal)?;
        let steps_json = serde_json::to_string(&new.steps).map_err(ApiError::internal)?;

        let mut tx = self.pool.begin().await.map_err(ApiError::store)?;

        let inserted = sqlx::query(
            "INSERT INTO executions (query, technique, answer, sources, steps, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&new.query)
        .bind(new.technique.as_str())
        .bind(&new.answer)
        .bind(&sources_json)
        .bind(&steps_json)
        .bind(format_ts(created_at))
        .execute(&mut *tx)
        .await
        .map_err(ApiError::store)?;

        let id = inserted.last_insert_rowid();

        let m = &new.metrics;
        sqlx::query(
            "INSERT INTO execution_metrics (
                execution_id, latency_ms, tokens_input, tokens_output, tokens_total,
                cost_usd, chunks_retrieved, chunks_used,
                faithfulness, answer_relevancy, context_precision, context_recall
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(id)
        .bind(m.latency_ms)
        .bind(m.tokens_input)
        .bind(m.tokens_output)
        .bind(m.tokens_total)
        .bind(m.cost_usd)
        .bind(m.chunks_retrieved)
        .bind(m.chunks_used)
        .bind(m.faithfulness)
        .bind(m.answer_relevancy)
        .bind(m.context_precision)
        .bind(m.context_recall)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::store)?;

        tx.commit().await.map_err(ApiError::store)?;
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Execution, ApiError> {
        let row = sqlx::query(&format!("{} WHERE e.id = ?1", SELECT_EXECUTION))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::store)?;

        match row {
            Some(row) => row_to_execution(&row),
            None => Err(ApiError::NotFound(format!("execution {} not found", id))),
        }
    }

    /// List executions matching the filter, most recent first.
    pub async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>, ApiError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_EXECUTION);
        qb.push(" WHERE 1=1");
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY e.created_at DESC, e.id DESC");

        match (filter.limit, filter.offset) {
            (Some(limit), offset) => {
                qb.push(" LIMIT ").push_bind(limit);
                if let Some(offset) = offset {
                    qb.push(" OFFSET ").push_bind(offset);
                }
            }
            (None, Some(offset)) => {
                // SQLite requires a LIMIT clause before OFFSET; -1 means unbounded.
                qb.push(" LIMIT -1 OFFSET ").push_bind(offset);
            }
            (None, None) => {}
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::store)?;

        // A single damaged row must not take the whole listing down.
        let mut executions = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_execution(row) {
                Ok(execution) => executions.push(execution),
                Err(err) => tracing::warn!("skipping undecodable execution row: {}", err),
            }
        }
        Ok(executions)
    }

    pub async fn count(&self, filter: &ExecutionFilter) -> Result<i64, ApiError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM executions e WHERE 1=1");
        push_filter(&mut qb, filter);

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::store)?;
        Ok(row.get(0))
    }

    /// Delete matching executions; metrics rows cascade. Idempotent: a
    /// filter matching nothing deletes 0 rows and is not an error.
    pub async fn purge(&self, filter: &ExecutionFilter) -> Result<u64, ApiError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM executions WHERE 1=1");
        push_filter_unprefixed(&mut qb, filter);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;
        Ok(result.rows_affected())
    }
}

const SELECT_EXECUTION: &str = "SELECT e.id, e.query, e.technique, e.answer, e.sources, e.steps, e.created_at, \
     m.latency_ms, m.tokens_input, m.tokens_output, m.tokens_total, m.cost_usd, \
     m.chunks_retrieved, m.chunks_used, m.faithfulness, m.answer_relevancy, \
     m.context_precision, m.context_recall \
     FROM executions e JOIN execution_metrics m ON m.execution_id = e.id";

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ExecutionFilter) {
    push_filter_columns(qb, filter, "e.technique", "e.created_at");
}

fn push_filter_unprefixed(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ExecutionFilter) {
    push_filter_columns(qb, filter, "technique", "created_at");
}

fn push_filter_columns(
    qb: &mut QueryBuilder<'_, Sqlite>,
    filter: &ExecutionFilter,
    technique_col: &str,
    created_col: &str,
) {
    if !filter.techniques.is_empty() {
        qb.push(format!(" AND {} IN (", technique_col));
        let mut separated = qb.separated(", ");
        for technique in &filter.techniques {
            separated.push_bind(technique.as_str());
        }
        qb.push(")");
    }
    if let Some(from) = filter.from {
        qb.push(format!(" AND {} >= ", created_col))
            .push_bind(format_ts(from));
    }
    if let Some(to) = filter.to {
        qb.push(format!(" AND {} <= ", created_col))
            .push_bind(format_ts(to));
    }
}

/// Fixed-width RFC 3339 so that lexicographic ordering in SQLite matches
/// chronological ordering.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_execution(row: &sqlx::sqlite::SqliteRow) -> Result<Execution, ApiError> {
    let technique_tag: String = row.get("technique");
    let technique = Technique::parse(&technique_tag)
        .map_err(|_| ApiError::Internal(format!("corrupt technique tag '{}'", technique_tag)))?;

    let created_raw: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map_err(ApiError::internal)?
        .with_timezone(&Utc);

    let sources_raw: String = row.get("sources");
    let sources = serde_json::from_str(&sources_raw).unwrap_or_default();

    let steps_raw: String = row.get("steps");
    let steps = serde_json::from_str(&steps_raw).unwrap_or(serde_json::Value::Null);

    Ok(Execution {
        id: row.get("id"),
        query: row.get("query"),
        technique,
        answer: row.get("answer"),
        sources,
        steps,
        metrics: ExecutionMetrics {
            latency_ms: row.get("latency_ms"),
            tokens_input: row.get("tokens_input"),
            tokens_output: row.get("tokens_output"),
            tokens_total: row.get("tokens_total"),
            cost_usd: row.get("cost_usd"),
            chunks_retrieved: row.get("chunks_retrieved"),
            chunks_used: row.get("chunks_used"),
            faithfulness: row.get("faithfulness"),
            answer_relevancy: row.get("answer_relevancy"),
            context_precision: row.get("context_precision"),
            context_recall: row.get("context_recall"),
        },
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceChunk;
    use chrono::TimeZone;
    use serde_json::json;

    async fn open_store() -> (ExecutionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::store::open_pool(&dir.path().join("test.db"))
            .await
            .unwrap();
        (ExecutionStore::new(pool).await.unwrap(), dir)
    }

    fn sample(technique: Technique, latency_ms: f64) -> NewExecution {
        NewExecution {
            query: "what is retrieval-augmented generation?".to_string(),
            technique,
            answer: "it augments generation with retrieved context".to_string(),
            sources: vec![SourceChunk {
                content: "RAG retrieves chunks before generating".to_string(),
                score: 0.87,
                document: "intro.md".to_string(),
                chunk_index: 0,
                page: Some(1),
                pre_rerank_score: None,
            }],
            steps: json!([{"step": "similarity_search", "duration_ms": 12.0}]),
            metrics: ExecutionMetrics {
                latency_ms,
                chunks_retrieved: Some(5),
                chunks_used: Some(1),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn record_then_get_round_trips() {
        let (store, _dir) = open_store().await;
        let id = store.record(sample(Technique::Baseline, 100.0)).await.unwrap();
        let execution = store.get(id).await.unwrap();
        assert_eq!(execution.id, id);
        assert_eq!(execution.technique, Technique::Baseline);
        assert_eq!(execution.sources.len(), 1);
        assert_eq!(execution.sources[0].score, 0.87);
        assert_eq!(execution.metrics.latency_ms, 100.0);
        assert_eq!(execution.metrics.faithfulness, None);
    }

    #[tokio::test]
    async fn record_rejects_empty_query() {
        let (store, _dir) = open_store().await;
        let mut new = sample(Technique::Baseline, 1.0);
        new.query = "   ".to_string();
        let err = store.record(new).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn get_missing_id_is_not_found() {
        let (store, _dir) = open_store().await;
        let err = store.get(999).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_orders_by_created_at_desc_regardless_of_insertion_order() {
        let (store, _dir) = open_store().await;
        let at = |secs: i64| Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        let a = store
            .record_at(sample(Technique::Baseline, 1.0), at(100))
            .await
            .unwrap();
        let b = store
            .record_at(sample(Technique::Hyde, 1.0), at(300))
            .await
            .unwrap();
        let c = store
            .record_at(sample(Technique::Fusion, 1.0), at(200))
            .await
            .unwrap();

        let listed = store.list(&ExecutionFilter::default()).await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b, c, a]);
    }

    #[tokio::test]
    async fn list_filters_by_technique_and_date_range() {
        let (store, _dir) = open_store().await;
        let at = |secs: i64| Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        store
            .record_at(sample(Technique::Baseline, 1.0), at(0))
            .await
            .unwrap();
        store
            .record_at(sample(Technique::Hyde, 1.0), at(60))
            .await
            .unwrap();
        store
            .record_at(sample(Technique::Hyde, 1.0), at(120))
            .await
            .unwrap();

        let filter = ExecutionFilter {
            techniques: vec![Technique::Hyde],
            from: Some(at(60)),
            to: Some(at(60)),
            ..Default::default()
        };
        let listed = store.list(&filter).await.unwrap();
        // Inclusive bounds: exactly the execution at t=60.
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].technique, Technique::Hyde);
    }

    #[tokio::test]
    async fn list_pagination_applies_limit_and_offset() {
        let (store, _dir) = open_store().await;
        let at = |secs: i64| Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        for i in 0..5 {
            store
                .record_at(sample(Technique::Baseline, 1.0), at(i * 10))
                .await
                .unwrap();
        }
        let filter = ExecutionFilter {
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        };
        let listed = store.list(&filter).await.unwrap();
        assert_eq!(listed.len(), 2);
        // Newest first, skipping the single newest row.
        assert!(listed[0].created_at > listed[1].created_at);
    }

    #[tokio::test]
    async fn purge_on_empty_match_returns_zero() {
        let (store, _dir) = open_store().await;
        let filter = ExecutionFilter {
            techniques: vec![Technique::Agentic],
            ..Default::default()
        };
        assert_eq!(store.purge(&filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn purge_deletes_matching_and_cascades_metrics() {
        let (store, _dir) = open_store().await;
        store.record(sample(Technique::Baseline, 1.0)).await.unwrap();
        store.record(sample(Technique::Hyde, 1.0)).await.unwrap();

        let filter = ExecutionFilter {
            techniques: vec![Technique::Baseline],
            ..Default::default()
        };
        assert_eq!(store.purge(&filter).await.unwrap(), 1);
        assert_eq!(store.count(&ExecutionFilter::default()).await.unwrap(), 1);
        // Purging again matches nothing.
        assert_eq!(store.purge(&filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recorded_latencies_average_through_aggregation() {
        let (store, _dir) = open_store().await;
        for latency in [100.0, 200.0, 300.0] {
            store
                .record(sample(Technique::Baseline, latency))
                .await
                .unwrap();
        }
        let listed = store.list(&ExecutionFilter::default()).await.unwrap();
        let report = crate::analytics::aggregate(&listed, ExecutionFilter::default());
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].avg_latency_ms, Some(200.0));
    }
}
