use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::clock;
use crate::job::{DlqEntry, Job, JobId, JobState, NewJob, QueueStatus, truncate_chars};
use crate::{DlqPayload, QueueError};

/// Visibility lease taken by a claim, refreshed while the job runs.
pub const LEASE_SECS: i64 = 60;

/// Diagnostic strings are capped at this many characters.
pub const MAX_ERROR_CHARS: usize = 200;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS jobs (
        id          TEXT PRIMARY KEY,
        command     TEXT NOT NULL,
        state       TEXT NOT NULL DEFAULT 'pending',
        attempts    INTEGER NOT NULL DEFAULT 0,
        max_retries INTEGER NOT NULL DEFAULT 3,
        priority    INTEGER NOT NULL DEFAULT 0,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        run_at      TEXT,
        last_error  TEXT,
        locked_by   TEXT,
        lock_until  TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_jobs_state_run_at ON jobs (state, run_at)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_priority_created ON jobs (priority DESC, created_at ASC)",
    "CREATE TABLE IF NOT EXISTS dlq (
        id      TEXT PRIMARY KEY,
        job_id  TEXT NOT NULL,
        payload TEXT NOT NULL,
        dead_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS config (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS workers (
        id           TEXT PRIMARY KEY,
        pid          INTEGER NOT NULL,
        started_at   TEXT NOT NULL,
        heartbeat_at TEXT NOT NULL
    )",
];

/// SQLite-backed store. The database file is the sole coordination point
/// between producers, workers, and status readers; cloning is cheap and
/// clones share the underlying pool.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the queue database at `path`.
    ///
    /// WAL keeps readers unblocked during writes; the busy timeout absorbs
    /// claim contention between worker processes.
    pub async fn open(path: &Path) -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(3))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Transient in-memory store. A single connection, because every
    /// `:memory:` connection is its own database.
    pub async fn open_in_memory() -> Result<Self, QueueError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<(), QueueError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert a new `pending` job. Returns the (possibly generated) job id;
    /// re-using the id of an existing row surfaces as a database error.
    pub async fn enqueue(&self, req: NewJob) -> Result<JobId, QueueError> {
        if req.command.trim().is_empty() {
            return Err(QueueError::MissingCommand);
        }

        let id = req
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| crate::generate_id("job"));
        let max_retries = match req.max_retries {
            Some(n) => n.max(0),
            None => self.config_get_int("max_retries").await?,
        };
        let priority = req.priority.unwrap_or(0);
        let now = clock::now();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, command, state, attempts, max_retries, priority,
                              created_at, updated_at, run_at)
            VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?5, ?5, ?6)
            "#,
        )
        .bind(&id)
        .bind(&req.command)
        .bind(max_retries)
        .bind(priority)
        .bind(&now)
        .bind(&req.run_at)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<Job>, QueueError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    /// Jobs in `state`, oldest first. The dead letter queue has its own
    /// listing (`dlq_list`); rows left in `dead` are the residue of a move.
    pub async fn list_jobs(&self, state: JobState) -> Result<Vec<Job>, QueueError> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE state = ?1 ORDER BY created_at ASC")
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    pub async fn dlq_list(&self) -> Result<Vec<DlqEntry>, QueueError> {
        let rows = sqlx::query("SELECT * FROM dlq ORDER BY dead_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_dlq).collect()
    }

    /// Delete a DLQ entry and re-create its job as a fresh `pending` row,
    /// atomically. The preserved fields are exactly the payload snapshot;
    /// `attempts` restarts at 0. The residual `dead` row is replaced.
    pub async fn dlq_retry(&self, dlq_id: &str) -> Result<JobId, QueueError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM dlq WHERE id = ?1")
            .bind(dlq_id)
            .fetch_optional(&mut *tx)
            .await?;
        let entry = match row {
            Some(ref row) => row_to_dlq(row)?,
            None => return Err(QueueError::NotFound(dlq_id.to_string())),
        };

        sqlx::query("DELETE FROM dlq WHERE id = ?1")
            .bind(dlq_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM jobs WHERE id = ?1")
            .bind(&entry.payload.id)
            .execute(&mut *tx)
            .await?;

        let now = clock::now();
        sqlx::query(
            r#"
            INSERT INTO jobs (id, command, state, attempts, max_retries, priority,
                              created_at, updated_at)
            VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(&entry.payload.id)
        .bind(&entry.payload.command)
        .bind(entry.payload.max_retries)
        .bind(entry.payload.priority)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(entry.payload.id)
    }

    /// Counts by state plus worker liveness and the oldest pending mark.
    pub async fn status(&self) -> Result<QueueStatus, QueueError> {
        let counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await?;

        let mut status = QueueStatus {
            pending: 0,
            processing: 0,
            completed: 0,
            failed: 0,
            dead: 0,
            active_workers: self.active_workers().await?,
            oldest_pending: None,
        };
        for (state, n) in counts {
            match JobState::parse(&state) {
                Some(JobState::Pending) => status.pending = n,
                Some(JobState::Processing) => status.processing = n,
                Some(JobState::Completed) => status.completed = n,
                Some(JobState::Failed) => status.failed = n,
                Some(JobState::Dead) => status.dead = n,
                None => return Err(QueueError::Internal(format!("unknown job state: {state}"))),
            }
        }

        status.oldest_pending =
            sqlx::query_scalar("SELECT MIN(created_at) FROM jobs WHERE state = 'pending'")
                .fetch_one(&self.pool)
                .await?;

        Ok(status)
    }

    /// Atomically claim the next runnable job for `worker_id`.
    ///
    /// Runnable: `pending` or `failed`, past `run_at`, and not under a live
    /// lease. Selection and mutation happen in one statement, so two
    /// concurrent claimers serialize through the database writer and the
    /// loser sees the row already locked. An expired `lock_until` makes an
    /// abandoned job eligible again, which is where at-least-once delivery
    /// comes from.
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, QueueError> {
        let now = clock::now();
        let lock_until = clock::now_plus(LEASE_SECS);

        let claimed = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'processing',
                locked_by = ?1,
                lock_until = ?2,
                attempts = attempts + 1,
                updated_at = ?3
            WHERE id = (
                SELECT id FROM jobs
                WHERE state IN ('pending', 'failed')
                  AND (run_at IS NULL OR run_at <= ?3)
                  AND (lock_until IS NULL OR lock_until <= ?3)
                ORDER BY priority DESC, created_at ASC
                LIMIT 1
            )
            "#,
        )
        .bind(worker_id)
        .bind(&lock_until)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if claimed == 0 {
            return Ok(None);
        }

        let row = sqlx::query(
            r#"
            SELECT * FROM jobs
            WHERE locked_by = ?1 AND state = 'processing'
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    /// Extend the lease on a running job. Guarded by `locked_by` so a stolen
    /// lease is never extended; returns whether the lease was still ours.
    pub async fn refresh_lock(&self, job_id: &str, worker_id: &str) -> Result<bool, QueueError> {
        let affected = sqlx::query(
            r#"
            UPDATE jobs
            SET lock_until = ?1
            WHERE id = ?2 AND locked_by = ?3 AND state = 'processing'
            "#,
        )
        .bind(clock::now_plus(LEASE_SECS))
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    /// Success: `completed`, lease and diagnostics cleared.
    pub async fn complete(&self, job_id: &str, worker_id: &str) -> Result<(), QueueError> {
        let affected = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed',
                locked_by = NULL,
                lock_until = NULL,
                last_error = NULL,
                updated_at = ?1
            WHERE id = ?2 AND locked_by = ?3 AND state = 'processing'
            "#,
        )
        .bind(clock::now())
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(QueueError::InvalidState);
        }
        Ok(())
    }

    /// Failure with retry budget left: schedule the next attempt.
    ///
    /// `lock_until` is set to `run_at`, so the claim predicate hides the job
    /// until it is due. The lease column doubles as the retry schedule.
    pub async fn retry_later(
        &self,
        job_id: &str,
        worker_id: &str,
        error: &str,
        delay_secs: i64,
    ) -> Result<(), QueueError> {
        let run_at = clock::now_plus(delay_secs);
        let affected = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'failed',
                last_error = ?1,
                run_at = ?2,
                lock_until = ?2,
                locked_by = NULL,
                updated_at = ?3
            WHERE id = ?4 AND locked_by = ?5 AND state = 'processing'
            "#,
        )
        .bind(truncate_chars(error, MAX_ERROR_CHARS))
        .bind(&run_at)
        .bind(clock::now())
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(QueueError::InvalidState);
        }
        Ok(())
    }

    /// Retry budget exhausted: insert the DLQ snapshot and mark the job
    /// `dead` in one transaction.
    pub async fn move_to_dead_letter(
        &self,
        job: &Job,
        worker_id: &str,
        error: &str,
    ) -> Result<(), QueueError> {
        let payload = DlqPayload {
            id: job.id.clone(),
            command: job.command.clone(),
            max_retries: job.max_retries,
            priority: job.priority,
        };
        let payload = serde_json::to_string(&payload)
            .map_err(|e| QueueError::Internal(format!("dlq payload encode: {e}")))?;
        let now = clock::now();

        let mut tx = self.pool.begin().await?;

        let affected = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'dead',
                last_error = ?1,
                locked_by = NULL,
                lock_until = NULL,
                updated_at = ?2
            WHERE id = ?3 AND locked_by = ?4 AND state = 'processing'
            "#,
        )
        .bind(truncate_chars(error, MAX_ERROR_CHARS))
        .bind(&now)
        .bind(&job.id)
        .bind(worker_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if affected == 0 {
            tx.rollback().await?;
            return Err(QueueError::InvalidState);
        }

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO dlq (id, job_id, payload, dead_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(format!("dlq_{}", job.id))
        .bind(&job.id)
        .bind(&payload)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn parse_state(s: &str) -> Result<JobState, QueueError> {
    JobState::parse(s).ok_or_else(|| QueueError::Internal(format!("unknown job state: {s}")))
}

fn row_to_job(row: &SqliteRow) -> Result<Job, QueueError> {
    let state: String = row.try_get("state")?;
    Ok(Job {
        id: row.try_get("id")?,
        command: row.try_get("command")?,
        state: parse_state(&state)?,
        attempts: row.try_get("attempts")?,
        max_retries: row.try_get("max_retries")?,
        priority: row.try_get("priority")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        run_at: row.try_get("run_at")?,
        last_error: row.try_get("last_error")?,
        locked_by: row.try_get("locked_by")?,
        lock_until: row.try_get("lock_until")?,
    })
}

fn row_to_dlq(row: &SqliteRow) -> Result<DlqEntry, QueueError> {
    let payload: String = row.try_get("payload")?;
    let payload: DlqPayload = serde_json::from_str(&payload)
        .map_err(|e| QueueError::Internal(format!("dlq payload decode: {e}")))?;
    Ok(DlqEntry {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        payload,
        dead_at: row.try_get("dead_at")?,
    })
}
