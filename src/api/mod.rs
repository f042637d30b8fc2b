//! HTTP API
//!
//! Thin surface over the core: ingest, query, label discovery, live
//! streaming, health and metrics. Built with axum; CORS is permissive and
//! an optional API key guard covers every route except CORS preflights and
//! WebSocket upgrades.
//!
//! # Endpoints
//!
//! - `POST /ingest` - accept `{streams: [{labels, entries}]}`
//! - `GET /query` - selector query (`query`, `start`, `end`, `limit`)
//! - `GET /labels` - known label keys
//! - `GET /labels/{name}/values` - values for a key
//! - `GET /stream` - WebSocket fan-out (filter from query string)
//! - `GET /health` - status and counters
//! - `GET /ready` - readiness probe
//! - `GET /metrics` - prometheus text exposition

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::lifecycle::ShutdownToken;
use crate::stream::handler::stream_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.write_timeout_secs);
    let shared = Arc::new(state);

    Router::new()
        .route("/ingest", post(routes::ingest::ingest))
        .route("/query", get(routes::query::query))
        .route("/labels", get(routes::query::labels))
        .route("/labels/:name/values", get(routes::query::label_values))
        .route("/stream", get(stream_handler))
        .route("/health", get(routes::health::health))
        .route("/ready", get(routes::health::ready))
        .route("/metrics", get(routes::health::metrics_text))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&shared),
            require_api_key,
        ))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared)
}

/// Serve the router until the token fires, then drain gracefully
pub async fn serve(router: Router, port: u16, mut shutdown: ShutdownToken) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// API-key guard. Preflight requests and WebSocket upgrades pass through.
async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if !state.config.auth.enabled {
        return next.run(req).await;
    }
    if req.method() == Method::OPTIONS {
        return next.run(req).await;
    }
    let is_upgrade = req
        .headers()
        .get(header::UPGRADE)
        .map(|v| v.as_bytes().eq_ignore_ascii_case(b"websocket"))
        .unwrap_or(false);
    if is_upgrade {
        return next.run(req).await;
    }

    let provided = req
        .headers()
        .get("x-api-key")
        .or_else(|| req.headers().get(header::AUTHORIZATION))
        .and_then(|v| v.to_str().ok());

    if provided == Some(state.config.auth.api_key.as_str()) {
        next.run(req).await
    } else {
        (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::index::LabelIndex;
    use crate::ingest::{IngestOptions, Ingestor};
    use crate::lifecycle::Shutdown;
    use crate::query::QueryExecutor;
    use crate::storage::{ChunkReader, ChunkWriter};
    use crate::stream::hub::{HubConfig, StreamHub};
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use std::time::Instant;
    use tempfile::tempdir;
    use tower::util::ServiceExt;

    fn test_app(config: Config) -> (Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let writer = Arc::new(ChunkWriter::new(dir.path()).unwrap());
        let index = Arc::new(LabelIndex::new());
        let reader = Arc::new(ChunkReader::new(dir.path()));
        let executor = Arc::new(QueryExecutor::new(Arc::clone(&index), Arc::clone(&reader)));
        let hub = Arc::new(StreamHub::new(HubConfig::default()));
        let ingestor = Arc::new(Ingestor::start(
            IngestOptions::default(),
            Arc::clone(&writer),
            Arc::clone(&index),
            Arc::clone(&hub),
        ));
        let shutdown = Shutdown::new();

        let state = AppState {
            config: Arc::new(config),
            index,
            writer,
            executor,
            ingestor,
            hub,
            http_shutdown: shutdown.token(),
            start_time: Instant::now(),
        };

        (build_router(state), dir)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = test_app(Config::default());

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready() {
        let (app, _dir) = test_app(Config::default());

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auth_required_when_enabled() {
        let mut config = Config::default();
        config.auth.enabled = true;
        config.auth.api_key = "secret".to_string();

        let (app, _dir) = test_app(config);

        let denied = app
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .uri("/labels")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/labels")
                    .header("X-API-Key", "secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ingest_rejects_invalid_json() {
        let (app, _dir) = test_app(Config::default());

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/ingest")
                    .header("Content-Type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
