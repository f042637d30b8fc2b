//! loghive server
//!
//! Wires the core together and supervises the lifecycle. Startup order:
//! label index → chunk writer/reader → query executor → stream hub →
//! ingest workers → retention sweeper → HTTP surface. Shutdown reverses
//! the write path: drain HTTP, drain and flush the ingestor, then cancel
//! the background workers and close all subscribers.

use loghive::api::{self, build_router, AppState};
use loghive::config::{Config, LoggingConfig};
use loghive::index::LabelIndex;
use loghive::ingest::{IngestOptions, Ingestor};
use loghive::lifecycle::Shutdown;
use loghive::metrics;
use loghive::query::QueryExecutor;
use loghive::storage::{run_sweeper, ChunkReader, ChunkWriter};
use loghive::stream::hub::{HubConfig, StreamHub};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(Config::load_default());
    init_tracing(&config.logging);
    metrics::init();

    tracing::info!("Starting loghive v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config.storage.path, "Storage root");

    // Core components, leaves first.
    let index = Arc::new(LabelIndex::new());
    let writer = Arc::new(ChunkWriter::new(&config.storage.path)?);
    let reader = Arc::new(ChunkReader::new(&config.storage.path));
    let executor = Arc::new(QueryExecutor::new(Arc::clone(&index), Arc::clone(&reader)));

    // Streams already on disk become queryable immediately.
    index.restore_from_disk(writer.base_path()).await;

    let root_shutdown = Shutdown::new();
    let http_shutdown = Shutdown::new();

    let hub = Arc::new(StreamHub::new(HubConfig::default()));
    let hub_task = {
        let hub = Arc::clone(&hub);
        let token = root_shutdown.token();
        tokio::spawn(async move { hub.run(token).await })
    };

    let ingestor = Arc::new(Ingestor::start(
        IngestOptions {
            buffer_size: config.ingest.buffer_size,
            flush_interval: Duration::from_millis(config.ingest.flush_interval_ms),
            max_batch_size: config.ingest.max_batch_size,
            workers: config.ingest.workers,
        },
        Arc::clone(&writer),
        Arc::clone(&index),
        Arc::clone(&hub),
    ));

    let sweeper_task = tokio::spawn(run_sweeper(
        PathBuf::from(&config.storage.path),
        config.storage.retention_days,
        root_shutdown.token(),
    ));

    let state = AppState {
        config: Arc::clone(&config),
        index,
        writer,
        executor,
        ingestor: Arc::clone(&ingestor),
        hub,
        http_shutdown: http_shutdown.token(),
        start_time: Instant::now(),
    };
    let router = build_router(state);

    let server_task = tokio::spawn(api::serve(
        router,
        config.server.port,
        http_shutdown.token(),
    ));

    tracing::info!(port = config.server.port, "loghive is ready");
    tracing::info!(
        "WebSocket streaming available at ws://localhost:{}/stream",
        config.server.port
    );

    shutdown_signal().await;
    tracing::info!("Graceful shutdown initiated");

    // 1. Stop accepting connections and drain in-flight requests.
    http_shutdown.trigger();
    match timeout(
        Duration::from_secs(config.shutdown.http_timeout_secs),
        server_task,
    )
    .await
    {
        Ok(Ok(Ok(()))) => tracing::info!("HTTP server drained"),
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "HTTP server error"),
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server task panicked"),
        Err(_) => tracing::warn!("HTTP drain timeout"),
    }

    // 2. Drain the accept buffers and force-flush every batcher.
    match timeout(
        Duration::from_secs(config.shutdown.ingestor_timeout_secs),
        ingestor.stop(),
    )
    .await
    {
        Ok(()) => tracing::info!("Ingestor flushed"),
        Err(_) => tracing::warn!("Ingestor flush timeout"),
    }

    // 3. Stop background workers; the hub closes all subscribers.
    root_shutdown.trigger();
    let _ = timeout(Duration::from_secs(2), hub_task).await;
    let _ = timeout(Duration::from_secs(2), sweeper_task).await;

    tracing::info!("Server stopped cleanly");
    Ok(())
}

fn init_tracing(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("loghive={},tower_http=info", config.level))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
