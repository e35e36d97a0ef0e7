//! Saved comparative analyses.
//!
//! Each call to the analyze endpoint persists its narrative and the report
//! snapshot it was generated from, so the dashboard can show history.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub id: i64,
    pub question: String,
    pub response: String,
    pub report: Option<Value>,
    pub duration_ms: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub question: String,
    pub response: String,
    pub report: Option<Value>,
    pub duration_ms: Option<f64>,
}

#[derive(Clone)]
pub struct AnalysisStore {
    pool: SqlitePool,
}

impl AnalysisStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS analyses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                response TEXT NOT NULL,
                report TEXT,
                duration_ms REAL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(ApiError::store)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_analyses_created ON analyses(created_at)",
        )
        .execute(&pool)
        .await
        .map_err(ApiError::store)?;

        Ok(Self { pool })
    }

    pub async fn save(&self, new: NewAnalysis) -> Result<i64, ApiError> {
        let report_json = match &new.report {
            Some(report) => Some(serde_json::to_string(report).map_err(ApiError::internal)?),
            None => None,
        };
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let result = sqlx::query(
            "INSERT INTO analyses (question, response, report, duration_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&new.question)
        .bind(&new.response)
        .bind(report_json)
        .bind(new.duration_ms)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get(&self, id: i64) -> Result<Analysis, ApiError> {
        let row = sqlx::query(
            "SELECT id, question, response, report, duration_ms, created_at
             FROM analyses WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::store)?;

        match row {
            Some(row) => row_to_analysis(&row),
            None => Err(ApiError::NotFound(format!("analysis {} not found", id))),
        }
    }

    pub async fn list(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Analysis>, ApiError> {
        let from_bound = from
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Micros, true))
            .unwrap_or_else(|| "0000".to_string());
        let to_bound = to
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Micros, true))
            .unwrap_or_else(|| "9999".to_string());

        let rows = sqlx::query(
            "SELECT id, question, response, report, duration_ms, created_at
             FROM analyses
             WHERE created_at >= ?1 AND created_at <= ?2
             ORDER BY created_at DESC, id DESC
             LIMIT ?3 OFFSET ?4",
        )
        .bind(from_bound)
        .bind(to_bound)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::store)?;

        rows.iter().map(row_to_analysis).collect()
    }

    pub async fn delete(&self, id: i64) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM analyses WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_analysis(row: &sqlx::sqlite::SqliteRow) -> Result<Analysis, ApiError> {
    let created_raw: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map_err(ApiError::internal)?
        .with_timezone(&Utc);

    let report = row
        .get::<Option<String>, _>("report")
        .and_then(|raw| serde_json::from_str(&raw).ok());

    Ok(Analysis {
        id: row.get("id"),
        question: row.get("question"),
        response: row.get("response"),
        report,
        duration_ms: row.get("duration_ms"),
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn open_store() -> (AnalysisStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::store::open_pool(&dir.path().join("test.db"))
            .await
            .unwrap();
        (AnalysisStore::new(pool).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn save_get_list_delete_cycle() {
        let (store, _dir) = open_store().await;
        let id = store
            .save(NewAnalysis {
                question: "full comparative analysis".to_string(),
                response: "reranking leads on precision".to_string(),
                report: Some(json!({"rows": []})),
                duration_ms: Some(1234.5),
            })
            .await
            .unwrap();

        let analysis = store.get(id).await.unwrap();
        assert_eq!(analysis.response, "reranking leads on precision");
        assert!(analysis.report.is_some());

        let listed = store.list(None, None, 50, 0).await.unwrap();
        assert_eq!(listed.len(), 1);

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(matches!(store.get(id).await, Err(ApiError::NotFound(_))));
    }
}
