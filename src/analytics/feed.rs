//! Background comparison feed for the dashboard.
//!
//! An explicit scheduled task recomputes the unfiltered comparison on a
//! fixed interval and publishes it into a watch channel. The channel keeps
//! only the newest snapshot, so a slow tick superseded by a later one is
//! simply overwritten (last-response-wins). The task is aborted on
//! `stop()` or drop; there is no other teardown obligation, the computation
//! is stateless over durable data.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::analytics::{aggregate, ComparisonReport};
use crate::model::ExecutionFilter;
use crate::store::ExecutionStore;

#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub report: ComparisonReport,
    pub refreshed_at: DateTime<Utc>,
}

pub struct ComparisonFeed {
    latest: watch::Receiver<Option<FeedSnapshot>>,
    handle: JoinHandle<()>,
}

impl ComparisonFeed {
    pub fn spawn(store: ExecutionStore, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(None);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match store.list(&ExecutionFilter::default()).await {
                    Ok(executions) => {
                        let report = aggregate(&executions, ExecutionFilter::default());
                        let snapshot = FeedSnapshot {
                            report,
                            refreshed_at: Utc::now(),
                        };
                        if tx.send(Some(snapshot)).is_err() {
                            // No receivers left; the feed owner is gone.
                            break;
                        }
                    }
                    Err(err) => {
                        // Transient store trouble: skip this tick, the next
                        // scheduled one retries.
                        tracing::warn!("comparison feed refresh failed: {}", err);
                    }
                }
            }
        });

        Self { latest: rx, handle }
    }

    /// Most recent snapshot, if a refresh has completed yet.
    pub fn latest(&self) -> Option<FeedSnapshot> {
        self.latest.borrow().clone()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for ComparisonFeed {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExecutionMetrics, NewExecution, Technique};

    async fn open_store() -> (ExecutionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::store::open_pool(&dir.path().join("feed.db"))
            .await
            .unwrap();
        (ExecutionStore::new(pool).await.unwrap(), dir)
    }

    fn baseline_run(latency_ms: f64) -> NewExecution {
        NewExecution {
            query: "q".to_string(),
            technique: Technique::Baseline,
            answer: "a".to_string(),
            sources: Vec::new(),
            steps: serde_json::Value::Null,
            metrics: ExecutionMetrics {
                latency_ms,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn feed_publishes_and_overwrites_snapshots() {
        let (store, _dir) = open_store().await;
        store.record(baseline_run(100.0)).await.unwrap();

        let feed = ComparisonFeed::spawn(store.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;

        let first = feed.latest().expect("snapshot after first tick");
        assert_eq!(first.report.rows[0].avg_latency_ms, Some(100.0));

        store.record(baseline_run(300.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        // Only the newest snapshot is retained.
        let second = feed.latest().unwrap();
        assert_eq!(second.report.rows[0].avg_latency_ms, Some(200.0));
        assert!(second.refreshed_at >= first.refreshed_at);
    }

    #[tokio::test]
    async fn stop_aborts_the_refresh_task() {
        let (store, _dir) = open_store().await;
        let feed = ComparisonFeed::spawn(store, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        feed.stop();
        let frozen = feed.latest().map(|s| s.refreshed_at);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(feed.latest().map(|s| s.refreshed_at), frozen);
    }
}
