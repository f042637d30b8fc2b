//! # loghive
//!
//! A lightweight label-indexed log aggregation service: structured log
//! lines tagged by label sets are ingested through a buffered, batched
//! pipeline, persisted to append-only time-bucketed chunks on local disk,
//! served back through selector queries over a time window, and fanned out
//! in real time to WebSocket subscribers.
//!
//! ## Modules
//!
//! - [`storage`]: chunked on-disk layout, sidecar commit markers, retention
//! - [`index`]: in-memory label index for selector resolution
//! - [`ingest`]: accept → buffer → batch → persist → index → broadcast
//! - [`query`]: selector grammar and the query executor
//! - [`stream`]: live fan-out hub and WebSocket handler
//! - [`api`]: HTTP surface (axum)
//! - [`config`]: TOML configuration with environment overrides
//! - [`lifecycle`]: graceful shutdown coordination
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use loghive::index::LabelIndex;
//! use loghive::ingest::{IncomingEntry, IngestOptions, Ingestor};
//! use loghive::query::QueryExecutor;
//! use loghive::storage::{ChunkReader, ChunkWriter, TimeRange};
//! use loghive::stream::hub::{HubConfig, StreamHub};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let writer = Arc::new(ChunkWriter::new("./data/logs")?);
//!     let reader = Arc::new(ChunkReader::new("./data/logs"));
//!     let index = Arc::new(LabelIndex::new());
//!     let hub = Arc::new(StreamHub::new(HubConfig::default()));
//!
//!     let ingestor = Ingestor::start(
//!         IngestOptions::default(),
//!         Arc::clone(&writer),
//!         Arc::clone(&index),
//!         Arc::clone(&hub),
//!     );
//!
//!     let mut labels = HashMap::new();
//!     labels.insert("service".to_string(), "api".to_string());
//!     ingestor.accept(
//!         &labels,
//!         vec![IncomingEntry { timestamp: None, line: "hello".to_string() }],
//!     )?;
//!     ingestor.stop().await;
//!
//!     let executor = QueryExecutor::new(index, reader);
//!     let output = executor
//!         .execute(r#"{service="api"}"#, TimeRange::last_hours(1), 10)
//!         .await?;
//!     println!("matched {} lines", output.stats.matched_lines);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod index;
pub mod ingest;
pub mod lifecycle;
pub mod metrics;
pub mod query;
pub mod storage;
pub mod stream;

// Re-export top-level types for convenience
pub use api::{build_router, serve, ApiError, ApiResult, AppState};
pub use config::{Config, ConfigError};
pub use index::LabelIndex;
pub use ingest::{IncomingEntry, IngestError, IngestOptions, Ingestor};
pub use lifecycle::{Shutdown, ShutdownToken};
pub use query::{QueryError, QueryExecutor, QueryOutput, QueryStats};
pub use storage::{
    ChunkMeta, ChunkReader, ChunkWriter, LabelSet, LogEntry, StorageError, StreamId, TimeRange,
};
pub use stream::{HubConfig, StreamHub};
