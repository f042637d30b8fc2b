//! Process metrics
//!
//! A crate-local prometheus registry exposed on `GET /metrics` in the text
//! exposition format. Counters are bumped at the event sites (ingest
//! workers, chunk writer, stream hub); the client gauge is set by the hub.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Crate-wide metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Entries accepted and persisted by the ingest pipeline
    pub static ref INGESTED_ENTRIES: IntCounter = IntCounter::with_opts(Opts::new(
        "loghive_ingested_entries_total",
        "Total log entries persisted"
    ))
    .expect("metric can be created");

    /// Entries dropped after a failed write retry
    pub static ref DROPPED_ENTRIES: IntCounter = IntCounter::with_opts(Opts::new(
        "loghive_dropped_entries_total",
        "Total log entries dropped after write failures"
    ))
    .expect("metric can be created");

    /// Chunks sealed on disk
    pub static ref CHUNKS_WRITTEN: IntCounter = IntCounter::with_opts(Opts::new(
        "loghive_chunks_written_total",
        "Total chunks sealed"
    ))
    .expect("metric can be created");

    /// Broadcasts discarded because the hub channel was full
    pub static ref HUB_DROPPED: IntCounter = IntCounter::with_opts(Opts::new(
        "loghive_hub_dropped_total",
        "Total broadcasts dropped by the stream hub"
    ))
    .expect("metric can be created");

    /// Currently connected live-stream subscribers
    pub static ref HUB_CLIENTS: IntGauge = IntGauge::with_opts(Opts::new(
        "loghive_hub_clients",
        "Connected live-stream subscribers"
    ))
    .expect("metric can be created");

    /// Queries executed
    pub static ref QUERIES_TOTAL: IntCounter = IntCounter::with_opts(Opts::new(
        "loghive_queries_total",
        "Total queries executed"
    ))
    .expect("metric can be created");
}

/// Register all metrics with the crate registry. Safe to call repeatedly.
pub fn init() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(INGESTED_ENTRIES.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(DROPPED_ENTRIES.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(CHUNKS_WRITTEN.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(HUB_DROPPED.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(HUB_CLIENTS.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(QUERIES_TOTAL.clone()))
            .expect("collector can be registered");
    });
}

/// Encode the registry in the prometheus text format
pub fn encode() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_registered_metrics() {
        init();
        INGESTED_ENTRIES.inc();

        let text = encode();
        assert!(text.contains("loghive_ingested_entries_total"));
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
    }
}
