//! Ingestion pipeline
//!
//! Accept → buffer → batch → persist → index → broadcast. The accept stage
//! validates payloads, assigns monotonically increasing ids, and enqueues
//! entries onto a bounded buffer sharded across the worker pool; routing
//! hashes the canonical label key so one stream always lands on the same
//! worker, preserving per-stream order. A full buffer fails fast with a
//! retriable error instead of blocking the caller.

pub mod worker;

use crate::index::LabelIndex;
use crate::storage::{validate_label, ChunkWriter, LabelSet, LogEntry, StreamId};
use crate::stream::hub::StreamHub;
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Errors surfaced by the accept stage
#[derive(Debug, Error)]
pub enum IngestError {
    /// The accept buffer is full; the caller should retry later.
    /// `accepted` counts entries of the same batch enqueued before the
    /// buffer filled.
    #[error("ingest buffer full")]
    BufferFull { accepted: usize },

    /// Shutdown has begun; no new entries are accepted
    #[error("ingestor is shutting down")]
    ShuttingDown { accepted: usize },

    /// The payload failed validation
    #[error("invalid entry: {0}")]
    Validation(String),
}

impl IngestError {
    /// Entries of the failed batch that were enqueued before the failure
    pub fn accepted(&self) -> usize {
        match self {
            IngestError::BufferFull { accepted } | IngestError::ShuttingDown { accepted } => {
                *accepted
            }
            IngestError::Validation(_) => 0,
        }
    }
}

/// Tuning for the ingest pipeline
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Total accept-buffer capacity, split across worker shards
    pub buffer_size: usize,
    /// Batcher flush interval
    pub flush_interval: Duration,
    /// Max entries per batch before an immediate flush
    pub max_batch_size: usize,
    /// Worker pool size
    pub workers: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            flush_interval: Duration::from_millis(5000),
            max_batch_size: 1000,
            workers: 4,
        }
    }
}

/// An entry as submitted by a caller, before id assignment
#[derive(Debug, Clone)]
pub struct IncomingEntry {
    /// Entry timestamp; `None` assigns the arrival time
    pub timestamp: Option<DateTime<Utc>>,
    pub line: String,
}

/// The ingestion pipeline front end
pub struct Ingestor {
    shards: StdRwLock<Vec<mpsc::Sender<LogEntry>>>,
    accepting: AtomicBool,
    next_id: AtomicU64,
    ingested: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    write_failures: Arc<StdMutex<HashMap<StreamId, u64>>>,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Ingestor {
    /// Spawn the worker pool and return the accept-side handle.
    ///
    /// Entry ids are seeded from the current wall clock in nanoseconds so
    /// they stay unique across restarts without a persisted high-water mark.
    pub fn start(
        options: IngestOptions,
        writer: Arc<ChunkWriter>,
        index: Arc<LabelIndex>,
        hub: Arc<StreamHub>,
    ) -> Self {
        let workers = options.workers.max(1);
        let shard_capacity = (options.buffer_size / workers).max(1);

        let ingested = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));
        let write_failures = Arc::new(StdMutex::new(HashMap::new()));

        let mut shards = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let (tx, rx) = mpsc::channel(shard_capacity);
            shards.push(tx);

            let ctx = worker::WorkerCtx {
                writer: Arc::clone(&writer),
                index: Arc::clone(&index),
                hub: Arc::clone(&hub),
                ingested: Arc::clone(&ingested),
                dropped: Arc::clone(&dropped),
                write_failures: Arc::clone(&write_failures),
                max_batch_size: options.max_batch_size.max(1),
                flush_interval: options.flush_interval,
            };
            handles.push(tokio::spawn(worker::run_worker(worker_id, rx, ctx)));
        }

        tracing::info!(
            workers,
            shard_capacity,
            flush_interval_ms = options.flush_interval.as_millis() as u64,
            "Ingestor started"
        );

        Self {
            shards: StdRwLock::new(shards),
            accepting: AtomicBool::new(true),
            next_id: AtomicU64::new(initial_entry_id()),
            ingested,
            dropped,
            write_failures,
            handles: tokio::sync::Mutex::new(handles),
        }
    }

    /// Validate a batch without touching the pipeline. Callers that accept
    /// several streams in one request run this over all of them first, so a
    /// bad stream cannot strand earlier streams' entries in the buffers.
    pub fn validate_batch(
        labels: &HashMap<String, String>,
        entries: &[IncomingEntry],
    ) -> Result<(), IngestError> {
        if labels.is_empty() {
            return Err(IngestError::Validation("labels cannot be empty".to_string()));
        }
        for (key, value) in labels {
            validate_label(key, value).map_err(IngestError::Validation)?;
        }
        for incoming in entries {
            if incoming.line.is_empty() {
                return Err(IngestError::Validation("log line cannot be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Validate and enqueue one stream's entries. Returns the number of
    /// entries accepted.
    ///
    /// The whole batch is validated before anything is enqueued: a
    /// validation failure has no side effects. A full shard still fails
    /// fast with [`IngestError::BufferFull`] mid-batch; entries enqueued
    /// before that failure stay accepted (at-least-once on caller retry)
    /// and the error carries their count.
    pub fn accept(
        &self,
        labels: &HashMap<String, String>,
        entries: Vec<IncomingEntry>,
    ) -> Result<usize, IngestError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(IngestError::ShuttingDown { accepted: 0 });
        }
        Self::validate_batch(labels, &entries)?;

        let label_set = LabelSet::from_map(labels);
        let label_map = label_set.to_map();

        let shards = self
            .shards
            .read()
            .map_err(|_| IngestError::ShuttingDown { accepted: 0 })?;
        if shards.is_empty() {
            return Err(IngestError::ShuttingDown { accepted: 0 });
        }
        let shard = &shards[shard_for(label_set.canonical(), shards.len())];

        let mut accepted = 0;
        for incoming in entries {
            let entry = LogEntry {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                timestamp: incoming.timestamp.unwrap_or_else(Utc::now),
                line: incoming.line,
                labels: label_map.clone(),
            };

            match shard.try_send(entry) {
                Ok(()) => accepted += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    return Err(IngestError::BufferFull { accepted })
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(IngestError::ShuttingDown { accepted })
                }
            }
        }

        Ok(accepted)
    }

    /// Entries persisted since startup
    pub fn ingested(&self) -> u64 {
        self.ingested.load(Ordering::Relaxed)
    }

    /// Entries dropped after repeated write failures
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Streams with at least one dropped batch
    pub fn failed_streams(&self) -> usize {
        self.write_failures.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Stop accepting, drain the buffers, and force-flush every batcher.
    ///
    /// Returns once all workers have flushed and exited; callers bound the
    /// wait with their own timeout.
    pub async fn stop(&self) {
        self.accepting.store(false, Ordering::Release);

        // Dropping the senders lets each worker drain its shard to empty
        // and run its final flush.
        if let Ok(mut shards) = self.shards.write() {
            shards.clear();
        }

        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Ingest worker exited abnormally");
            }
        }

        tracing::info!(
            ingested = self.ingested(),
            dropped = self.dropped(),
            "Ingestor drained"
        );
    }
}

fn shard_for(canonical: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

fn initial_entry_id() -> u64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0).max(1) as u64
}
