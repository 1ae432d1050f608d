//! SQLite-backed sample store: the persistence sink for decoded telemetry.
//!
//! The core calls [`SampleStore::save`] once per decoded telemetry record,
//! fire-and-forget; queries exist for consumers that want recent history.

use crate::link::{SampleSink, SinkError};
use crate::telemetry::TelemetrySample;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::path::Path;

/// One persisted telemetry row.
#[derive(Debug, Clone, PartialEq, serde::Serialize, FromRow)]
pub struct StoredSample {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    pub pot: i32,
    pub temp: f64,
    pub light: i32,
}

/// Append/query store over a SQLite pool.
#[derive(Clone)]
pub struct SampleStore {
    pool: SqlitePool,
}

impl SampleStore {
    /// Connect and migrate. For `sqlite://` file URLs the parent directory
    /// is created first.
    pub async fn new(database_url: &str) -> sqlx::Result<Self> {
        if let Some(rest) = database_url.strip_prefix("sqlite://") {
            if !rest.starts_with(':') {
                if let Some(parent) = Path::new(rest).parent() {
                    if !parent.as_os_str().is_empty() {
                        let _ = std::fs::create_dir_all(parent);
                    }
                }
            }
        }
        let pool = SqlitePool::connect(database_url).await?;
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> sqlx::Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS samples (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recorded_at TEXT NOT NULL,
            pot INTEGER NOT NULL,
            temp REAL NOT NULL,
            light INTEGER NOT NULL
        )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_samples_recorded ON samples(recorded_at)"#)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Append one sample; returns its row id.
    pub async fn save(&self, sample: &TelemetrySample) -> sqlx::Result<i64> {
        let now = Utc::now();
        // Single connection so last_insert_rowid() matches this INSERT.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("INSERT INTO samples (recorded_at, pot, temp, light) VALUES (?1, ?2, ?3, ?4)")
            .bind(now)
            .bind(sample.pot)
            .bind(sample.temp)
            .bind(sample.light)
            .execute(&mut *conn)
            .await?;
        let id: i64 = sqlx::query_scalar("SELECT last_insert_rowid()")
            .fetch_one(&mut *conn)
            .await?;
        Ok(id)
    }

    /// Most recent samples, newest first.
    pub async fn recent(&self, limit: i64) -> sqlx::Result<Vec<StoredSample>> {
        sqlx::query_as::<_, StoredSample>("SELECT * FROM samples ORDER BY id DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
    }

    /// Number of stored samples.
    pub async fn count(&self) -> sqlx::Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM samples")
            .fetch_one(&self.pool)
            .await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SampleSink for SampleStore {
    async fn save(&self, sample: TelemetrySample) -> Result<(), SinkError> {
        SampleStore::save(self, &sample)
            .await
            .map(|_| ())
            .map_err(|e| SinkError::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(pot: i32) -> TelemetrySample {
        TelemetrySample {
            pot,
            temp: 23.5,
            light: 880,
        }
    }

    async fn memory_store() -> SampleStore {
        SampleStore::new("sqlite::memory:").await.expect("init store")
    }

    #[tokio::test]
    async fn save_and_query_recent() {
        let store = memory_store().await;
        let id1 = store.save(&sample(1)).await.expect("save 1");
        let id2 = store.save(&sample(2)).await.expect("save 2");
        assert!(id1 < id2, "row ids should be ascending");

        let recent = store.recent(10).await.expect("recent");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].pot, 2, "newest first");
        assert_eq!(recent[1].pot, 1);
        assert_eq!(recent[0].temp, 23.5);
        assert_eq!(recent[0].light, 880);
    }

    #[tokio::test]
    async fn recent_respects_limit() {
        let store = memory_store().await;
        for pot in 0..5 {
            store.save(&sample(pot)).await.expect("save");
        }
        let recent = store.recent(2).await.expect("recent");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].pot, 4);
    }

    #[tokio::test]
    async fn count_tracks_saves() {
        let store = memory_store().await;
        assert_eq!(store.count().await.expect("count"), 0);
        store.save(&sample(1)).await.expect("save");
        assert_eq!(store.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn sink_save_is_infallible_shaped() {
        let store = memory_store().await;
        SampleSink::save(&store, sample(7)).await.expect("sink save");
        assert_eq!(store.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn file_backed_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("samples.db");
        let url = format!("sqlite://{}?mode=rwc", path.display());

        let store = SampleStore::new(&url).await.expect("init file store");
        store.save(&sample(3)).await.expect("save");
        assert_eq!(store.count().await.expect("count"), 1);
        store.close().await;
    }
}
