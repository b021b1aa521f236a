use crate::metrics;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::Html,
    routing::get,
};
use jobq_core::{QueueError, QueueStatus, SqliteStore};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Clone)]
pub struct AppState {
    pub store: SqliteStore,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "jobq dashboard",
        version = "0.1.0",
        description = "Read-only status API over the embedded job queue."
    ),
    paths(api_status),
    components(schemas(QueueStatus))
)]
struct ApiDoc;

pub fn build_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/", get(index))
        .route("/api/status", get(api_status))
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api)
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../assets/index.html"))
}

/// Current queue counts, worker liveness, and the oldest pending mark.
#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Queue status", body = QueueStatus),
        (status = 500, description = "Internal error")
    )
)]
async fn api_status(
    State(state): State<AppState>,
) -> Result<Json<QueueStatus>, (StatusCode, String)> {
    let status = state.store.status().await.map_err(map_err)?;
    Ok(Json(status))
}

async fn metrics_handler(
    State(state): State<AppState>,
) -> Result<([(axum::http::header::HeaderName, &'static str); 1], String), (StatusCode, String)> {
    let status = state.store.status().await.map_err(map_err)?;
    metrics::record(&status);
    Ok((
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        metrics::gather(),
    ))
}

fn map_err(e: QueueError) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
