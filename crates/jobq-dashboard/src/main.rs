use jobq_core::SqliteStore;
use jobq_dashboard::app::{self, AppState};
use jobq_dashboard::config::Config;
use jobq_dashboard::metrics;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    metrics::init_metrics();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobq_dashboard=info,tower_http=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env();

    let store = SqliteStore::open(&cfg.db_path)
        .await
        .expect("failed to open queue database");

    let app = app::build_app(AppState { store }).layer(TraceLayer::new_for_http());

    tracing::info!("listening on {}", cfg.bind);

    let listener = tokio::net::TcpListener::bind(cfg.bind)
        .await
        .expect("failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");

    async fn shutdown_signal() {
        // Wait for Ctrl+C
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    }
}
