#![cfg(unix)]

use std::time::Duration;

use jobq_core::{JobState, NewJob, SqliteStore, clock};
use jobq_worker::{WorkerConfig, run_with_store};
use tempfile::TempDir;

async fn setup() -> anyhow::Result<(TempDir, SqliteStore)> {
    let dir = tempfile::tempdir()?;
    let store = SqliteStore::open(&dir.path().join("queue.db")).await?;
    Ok((dir, store))
}

fn single_run() -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_millis(50),
        command_timeout: Duration::from_secs(5),
        single_run: true,
        ..WorkerConfig::default()
    }
}

/// Drive one worker iteration to completion, with a hang guard.
async fn run_once(store: &SqliteStore) -> anyhow::Result<()> {
    run_once_with(store, single_run()).await
}

async fn run_once_with(store: &SqliteStore, cfg: WorkerConfig) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(15), run_with_store(store.clone(), cfg)).await??;
    Ok(())
}

async fn expire_lease(store: &SqliteStore, job_id: &str) -> anyhow::Result<()> {
    let past = clock::now_plus(-5);
    sqlx::query("UPDATE jobs SET lock_until = ?1, run_at = ?1 WHERE id = ?2")
        .bind(&past)
        .bind(job_id)
        .execute(store.pool())
        .await?;
    Ok(())
}

#[tokio::test]
async fn completes_successful_job() -> anyhow::Result<()> {
    let (_dir, store) = setup().await?;

    store
        .enqueue(NewJob {
            id: Some("t1".to_string()),
            command: "echo ok".to_string(),
            ..NewJob::default()
        })
        .await?;
    run_once(&store).await?;

    let done = store.get_job("t1").await?.unwrap();
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.attempts, 1);
    assert!(done.locked_by.is_none());

    let status = store.status().await?;
    assert_eq!(status.completed, 1);
    assert_eq!(status.active_workers, 1);
    Ok(())
}

#[tokio::test]
async fn failing_job_is_rescheduled_with_backoff() -> anyhow::Result<()> {
    let (_dir, store) = setup().await?;

    store
        .enqueue(NewJob {
            id: Some("t2".to_string()),
            command: "exit 1".to_string(),
            max_retries: Some(2),
            ..NewJob::default()
        })
        .await?;
    run_once(&store).await?;

    let failed = store.get_job("t2").await?.unwrap();
    assert_eq!(failed.state, JobState::Failed);
    assert_eq!(failed.attempts, 1);
    assert!(failed.last_error.unwrap().starts_with("exit=1"));
    // delay = backoff_base^1 = 2s
    let run_at = failed.run_at.unwrap();
    assert!(run_at > clock::now());
    assert!(run_at < clock::now_plus(10));
    assert_eq!(failed.lock_until.unwrap(), run_at);
    Ok(())
}

#[tokio::test]
async fn retries_then_moves_to_dead_letter_queue() -> anyhow::Result<()> {
    let (_dir, store) = setup().await?;

    store
        .enqueue(NewJob {
            id: Some("t2".to_string()),
            command: "exit 1".to_string(),
            max_retries: Some(2),
            ..NewJob::default()
        })
        .await?;

    run_once(&store).await?;
    assert_eq!(store.get_job("t2").await?.unwrap().state, JobState::Failed);

    expire_lease(&store, "t2").await?;
    run_once(&store).await?;

    let dead = store.get_job("t2").await?.unwrap();
    assert_eq!(dead.state, JobState::Dead);
    assert_eq!(dead.attempts, 2);

    let entries = store.dlq_list().await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].job_id, "t2");
    Ok(())
}

#[tokio::test]
async fn zero_retry_budget_goes_straight_to_dlq() -> anyhow::Result<()> {
    let (_dir, store) = setup().await?;

    store
        .enqueue(NewJob {
            id: Some("t3".to_string()),
            command: "exit 7".to_string(),
            max_retries: Some(0),
            ..NewJob::default()
        })
        .await?;
    run_once(&store).await?;

    assert_eq!(store.get_job("t3").await?.unwrap().state, JobState::Dead);
    assert_eq!(store.dlq_list().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn higher_priority_runs_first() -> anyhow::Result<()> {
    let (_dir, store) = setup().await?;

    store
        .enqueue(NewJob {
            id: Some("lo".to_string()),
            command: "echo lo".to_string(),
            priority: Some(1),
            ..NewJob::default()
        })
        .await?;
    store
        .enqueue(NewJob {
            id: Some("hi".to_string()),
            command: "echo hi".to_string(),
            priority: Some(10),
            ..NewJob::default()
        })
        .await?;

    run_once(&store).await?;

    assert_eq!(store.get_job("hi").await?.unwrap().state, JobState::Completed);
    assert_eq!(store.get_job("lo").await?.unwrap().state, JobState::Pending);
    Ok(())
}

#[tokio::test]
async fn recovers_job_abandoned_by_crashed_worker() -> anyhow::Result<()> {
    let (_dir, store) = setup().await?;

    store
        .enqueue(NewJob {
            id: Some("t5".to_string()),
            command: "echo ok".to_string(),
            ..NewJob::default()
        })
        .await?;

    // worker A claims, then "crashes" without resolving
    store.claim_next("worker_dead").await?.expect("claimable");
    expire_lease(&store, "t5").await?;

    run_once(&store).await?;

    let done = store.get_job("t5").await?.unwrap();
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.attempts, 2);
    Ok(())
}

#[tokio::test]
async fn scheduled_job_waits_for_its_run_at() -> anyhow::Result<()> {
    let (_dir, store) = setup().await?;

    store
        .enqueue(NewJob {
            id: Some("t4".to_string()),
            command: "echo ok".to_string(),
            run_at: Some(clock::now_plus(1)),
            ..NewJob::default()
        })
        .await?;

    let worker = tokio::spawn(run_with_store(store.clone(), single_run()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.get_job("t4").await?.unwrap().state, JobState::Pending);

    tokio::time::timeout(Duration::from_secs(15), worker).await???;
    assert_eq!(store.get_job("t4").await?.unwrap().state, JobState::Completed);
    Ok(())
}

#[tokio::test]
async fn timed_out_command_follows_the_failure_path() -> anyhow::Result<()> {
    let (_dir, store) = setup().await?;

    store
        .enqueue(NewJob {
            id: Some("t7".to_string()),
            command: "sleep 30".to_string(),
            max_retries: Some(0),
            ..NewJob::default()
        })
        .await?;

    let cfg = WorkerConfig {
        command_timeout: Duration::from_millis(200),
        ..single_run()
    };
    run_once_with(&store, cfg).await?;

    let dead = store.get_job("t7").await?.unwrap();
    assert_eq!(dead.state, JobState::Dead);
    assert!(dead.last_error.unwrap().contains("timed out"));
    Ok(())
}

#[tokio::test]
async fn unrunnable_command_follows_the_failure_path() -> anyhow::Result<()> {
    let (_dir, store) = setup().await?;

    // bypass the enqueue guard: an empty command can only appear through
    // direct database manipulation
    let now = clock::now();
    sqlx::query(
        "INSERT INTO jobs (id, command, state, attempts, max_retries, priority, created_at, updated_at)
         VALUES ('t6', '', 'pending', 0, 0, 0, ?1, ?1)",
    )
    .bind(&now)
    .execute(store.pool())
    .await?;

    run_once(&store).await?;

    let dead = store.get_job("t6").await?.unwrap();
    assert_eq!(dead.state, JobState::Dead);
    assert!(dead.last_error.unwrap().starts_with("spawn failed"));
    Ok(())
}

#[tokio::test]
async fn backoff_base_is_read_from_config() -> anyhow::Result<()> {
    let (_dir, store) = setup().await?;

    store.config_set("backoff_base", "5").await?;
    store
        .enqueue(NewJob {
            id: Some("t8".to_string()),
            command: "exit 1".to_string(),
            max_retries: Some(3),
            ..NewJob::default()
        })
        .await?;
    run_once(&store).await?;

    // delay = 5^1, well past the default 2^1
    let failed = store.get_job("t8").await?.unwrap();
    let run_at = failed.run_at.unwrap();
    assert!(run_at > clock::now_plus(3));
    assert!(run_at < clock::now_plus(8));
    Ok(())
}
