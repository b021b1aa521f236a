mod executor;

pub use executor::{CommandResult, run_command};

use std::path::PathBuf;
use std::time::Duration;

use jobq_core::{Job, MAX_ERROR_CHARS, QueueError, SqliteStore, clock, generate_id, truncate_chars};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

const LOCK_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub db_path: PathBuf,
    /// Idle sleep between claim attempts.
    pub poll_interval: Duration,
    /// Wall-clock budget for one command execution.
    pub command_timeout: Duration,
    /// Exit after the first processed job (`SINGLE_RUN=1`).
    pub single_run: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("queue.db"),
            poll_interval: Duration::from_millis(200),
            command_timeout: Duration::from_secs(30),
            single_run: false,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let db_path = std::env::var("QUEUE_DB")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let poll_interval = std::env::var("POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        let single_run = std::env::var("SINGLE_RUN").is_ok_and(|v| v == "1");

        Self {
            db_path,
            poll_interval,
            single_run,
            ..defaults
        }
    }
}

pub async fn run_worker(cfg: WorkerConfig) -> anyhow::Result<()> {
    let store = SqliteStore::open(&cfg.db_path).await?;
    run_with_store(store, cfg).await
}

/// Claim loop on an already-opened store. Split out so integration tests can
/// drive a worker against their own database.
pub async fn run_with_store(store: SqliteStore, cfg: WorkerConfig) -> anyhow::Result<()> {
    let worker_id = generate_id("worker");
    let pid = std::process::id();

    let (stop_tx, mut stop_rx) = watch::channel(false);
    spawn_shutdown_listener(stop_tx);

    // The first heartbeat doubles as the store liveness check.
    store.worker_heartbeat(&worker_id, pid).await?;
    info!(worker_id = %worker_id, pid, single_run = cfg.single_run, "worker started");

    loop {
        if *stop_rx.borrow() {
            break;
        }

        // Best-effort: a missed heartbeat self-heals on the next iteration.
        if let Err(e) = store.worker_heartbeat(&worker_id, pid).await {
            warn!(error = %e, "heartbeat failed");
        }

        match store.claim_next(&worker_id).await {
            Ok(Some(job)) => {
                if let Err(e) = process_job(&store, &worker_id, &job, &cfg).await {
                    warn!(job_id = %job.id, error = %e, "job resolution failed");
                    idle(&mut stop_rx, ERROR_BACKOFF).await;
                }
                if cfg.single_run {
                    info!("single-run mode, stopping");
                    break;
                }
            }
            Ok(None) => idle(&mut stop_rx, cfg.poll_interval).await,
            Err(e) => {
                warn!(error = %e, "claim failed");
                idle(&mut stop_rx, ERROR_BACKOFF).await;
            }
        }
    }

    info!("worker stopped");
    Ok(())
}

async fn idle(stop_rx: &mut watch::Receiver<bool>, duration: Duration) {
    tokio::select! {
        _ = stop_rx.changed() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}

fn spawn_shutdown_listener(stop_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, finishing current job before exit");
        let _ = stop_tx.send(true);
    });
}

/// SIGINT everywhere; additionally SIGTERM on unix. The running subprocess is
/// never killed by shutdown, only by its own timeout.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn process_job(
    store: &SqliteStore,
    worker_id: &str,
    job: &Job,
    cfg: &WorkerConfig,
) -> Result<(), QueueError> {
    let span = info_span!("job", job_id = %job.id, attempts = job.attempts);
    async {
        // Read per execution so operator updates apply to the next attempt.
        let backoff_base = match store.config_get_int("backoff_base").await {
            Ok(base) if base > 0 => base,
            _ => 2,
        };

        let (refresh_stop, refresh_rx) = watch::channel(false);
        let refresher = spawn_lock_refresher(
            store.clone(),
            job.id.clone(),
            worker_id.to_string(),
            refresh_rx,
        );

        info!(command = %job.command, "running command");
        let result = executor::run_command(&job.command, cfg.command_timeout).await;

        // The refresher terminates before resolution touches the row.
        refresh_stop.send(true).ok();
        let _ = refresher.await;

        resolve(store, worker_id, job, backoff_base, cfg.command_timeout, result).await
    }
    .instrument(span)
    .await
}

fn spawn_lock_refresher(
    store: SqliteStore,
    job_id: String,
    worker_id: String,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stop_rx.changed() => {}
                _ = tokio::time::sleep(LOCK_REFRESH_INTERVAL) => {}
            }
            if *stop_rx.borrow() {
                break;
            }
            match store.refresh_lock(&job_id, &worker_id).await {
                Ok(true) => debug!(job_id = %job_id, "lease refreshed"),
                Ok(false) => warn!(job_id = %job_id, "lease no longer held"),
                Err(e) => warn!(job_id = %job_id, error = %e, "lease refresh failed"),
            }
        }
    })
}

/// Outcome state machine. `job.attempts` already counts the attempt that
/// just ran (incremented at claim), so `attempts >= max_retries` means the
/// budget is spent.
async fn resolve(
    store: &SqliteStore,
    worker_id: &str,
    job: &Job,
    backoff_base: i64,
    timeout: Duration,
    result: CommandResult,
) -> Result<(), QueueError> {
    let failure = match result {
        CommandResult::Completed { code: 0, .. } => {
            store.complete(&job.id, worker_id).await?;
            info!("job completed");
            return Ok(());
        }
        CommandResult::Completed { code, stderr, .. } => {
            format!("exit={code}: {}", truncate_chars(stderr.trim(), MAX_ERROR_CHARS))
        }
        CommandResult::TimedOut => format!("timed out after {}s", timeout.as_secs()),
        CommandResult::SpawnFailed(e) => format!("spawn failed: {e}"),
    };

    if job.attempts < job.max_retries {
        let delay = clock::backoff_delay(backoff_base, job.attempts);
        warn!(error = %failure, delay_secs = delay, "job failed, retry scheduled");
        store.retry_later(&job.id, worker_id, &failure, delay).await
    } else {
        warn!(error = %failure, "retries exhausted, moving job to dead letter queue");
        store.move_to_dead_letter(job, worker_id, &failure).await
    }
}
