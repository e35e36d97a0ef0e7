//! SQLite persistence.
//!
//! One database file holds the execution log and the saved analyses. Both
//! stores share a pool; each creates its own tables at startup.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::core::errors::ApiError;

mod analyses;
mod executions;

pub use analyses::{Analysis, AnalysisStore, NewAnalysis};
pub use executions::ExecutionStore;

pub async fn open_pool(db_path: &Path) -> Result<SqlitePool, ApiError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(ApiError::internal)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(4)
        .connect_with(options)
        .await
        .map_err(ApiError::store)
}
