//! Health and metrics routes
//!
//! - GET /health - status plus ingest/hub/storage counters
//! - GET /ready  - plain readiness probe
//! - GET /metrics - prometheus text exposition

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::{
    HealthResponse, HubCounters, IngestCounters, StorageCounters,
};
use crate::api::state::AppState;
use crate::metrics;

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        streams: state.index.stream_count().await,
        ingest: IngestCounters {
            ingested: state.ingestor.ingested(),
            dropped: state.ingestor.dropped(),
            failed_streams: state.ingestor.failed_streams(),
        },
        hub: HubCounters {
            clients: state.hub.client_count().await,
            dropped: state.hub.dropped(),
        },
        storage: StorageCounters {
            chunks: state.writer.chunk_count(),
            size_bytes: state.writer.storage_size(),
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /ready
pub async fn ready() -> &'static str {
    "ready"
}

/// GET /metrics
pub async fn metrics_text() -> String {
    metrics::encode()
}
