//! Application state
//!
//! Shared state accessible by all API handlers, wrapped in `Arc` by the
//! router builder.

use crate::config::Config;
use crate::index::LabelIndex;
use crate::ingest::Ingestor;
use crate::lifecycle::ShutdownToken;
use crate::query::QueryExecutor;
use crate::storage::ChunkWriter;
use crate::stream::hub::StreamHub;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
pub struct AppState {
    pub config: Arc<Config>,
    pub index: Arc<LabelIndex>,
    pub writer: Arc<ChunkWriter>,
    pub executor: Arc<QueryExecutor>,
    pub ingestor: Arc<Ingestor>,
    pub hub: Arc<StreamHub>,
    /// Fires when the HTTP surface starts draining; WebSocket handlers
    /// close their connections on it
    pub http_shutdown: ShutdownToken,
    pub start_time: Instant,
}

impl AppState {
    /// Server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
