use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use jobq_core::{NewJob, SqliteStore};
use jobq_dashboard::app::{AppState, build_app};
use jobq_dashboard::metrics;
use tempfile::TempDir;
use tower::ServiceExt;

async fn setup() -> anyhow::Result<(TempDir, SqliteStore)> {
    let dir = tempfile::tempdir()?;
    let store = SqliteStore::open(&dir.path().join("queue.db")).await?;
    Ok((dir, store))
}

#[tokio::test]
async fn status_endpoint_reports_counts() -> anyhow::Result<()> {
    let (_dir, store) = setup().await?;

    store
        .enqueue(NewJob {
            command: "echo hi".to_string(),
            ..NewJob::default()
        })
        .await?;

    let app = build_app(AppState { store });
    let response = app
        .oneshot(Request::get("/api/status").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await?.to_bytes();
    let status: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(status["pending"], 1);
    assert_eq!(status["completed"], 0);
    assert_eq!(status["active_workers"], 0);
    assert!(status["oldest_pending"].is_string());
    Ok(())
}

#[tokio::test]
async fn health_and_index_respond() -> anyhow::Result<()> {
    let (_dir, store) = setup().await?;
    let app = build_app(AppState { store });

    let health = app
        .clone()
        .oneshot(Request::get("/healthz").body(Body::empty())?)
        .await?;
    assert_eq!(health.status(), StatusCode::OK);

    let index = app.oneshot(Request::get("/").body(Body::empty())?).await?;
    assert_eq!(index.status(), StatusCode::OK);
    let body = index.into_body().collect().await?.to_bytes();
    assert!(std::str::from_utf8(&body)?.contains("/api/status"));
    Ok(())
}

#[tokio::test]
async fn metrics_endpoint_exports_gauges() -> anyhow::Result<()> {
    metrics::init_metrics();
    let (_dir, store) = setup().await?;

    store
        .enqueue(NewJob {
            command: "echo hi".to_string(),
            ..NewJob::default()
        })
        .await?;

    let app = build_app(AppState { store });
    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await?.to_bytes();
    let text = std::str::from_utf8(&body)?;
    assert!(text.contains("jobs_pending 1"));
    Ok(())
}
