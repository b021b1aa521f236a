//! Worker liveness records.
//!
//! Each worker process upserts a heartbeat row; `status.active_workers`
//! counts rows with a heartbeat inside the freshness window. Stale rows are
//! harmless and simply fall out of the count.

use sqlx::Row;

use crate::job::WorkerRow;
use crate::store::SqliteStore;
use crate::{QueueError, clock};

/// A worker is "active" if it heartbeat within this many seconds.
pub const ACTIVE_WINDOW_SECS: i64 = 10;

impl SqliteStore {
    /// Record liveness for `worker_id`, preserving the original `started_at`.
    pub async fn worker_heartbeat(&self, worker_id: &str, pid: u32) -> Result<(), QueueError> {
        let now = clock::now();
        sqlx::query(
            r#"
            INSERT INTO workers (id, pid, started_at, heartbeat_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT (id) DO UPDATE SET heartbeat_at = excluded.heartbeat_at
            "#,
        )
        .bind(worker_id)
        .bind(pid as i64)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn active_workers(&self) -> Result<i64, QueueError> {
        let cutoff = clock::now_plus(-ACTIVE_WINDOW_SECS);
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM workers WHERE heartbeat_at > ?1")
            .bind(&cutoff)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn list_workers(&self) -> Result<Vec<WorkerRow>, QueueError> {
        let rows = sqlx::query("SELECT * FROM workers ORDER BY started_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(WorkerRow {
                    id: row.try_get("id")?,
                    pid: row.try_get("pid")?,
                    started_at: row.try_get("started_at")?,
                    heartbeat_at: row.try_get("heartbeat_at")?,
                })
            })
            .collect()
    }
}
