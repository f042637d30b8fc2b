//! Ingest workers
//!
//! Each worker drains one shard of the accept buffer and coalesces entries
//! into per-stream batches. A batch is flushed when it reaches the batch
//! size limit or when the flush ticker fires. A successful flush seals a
//! chunk, registers the stream in the label index, and fans the entries out
//! to the live-stream hub.

use crate::index::LabelIndex;
use crate::metrics;
use crate::storage::{ChunkWriter, LabelSet, LogEntry, StreamId};
use crate::stream::hub::StreamHub;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Shared environment for the worker pool
pub(crate) struct WorkerCtx {
    pub writer: Arc<ChunkWriter>,
    pub index: Arc<LabelIndex>,
    pub hub: Arc<StreamHub>,
    pub ingested: Arc<AtomicU64>,
    pub dropped: Arc<AtomicU64>,
    pub write_failures: Arc<StdMutex<HashMap<StreamId, u64>>>,
    pub max_batch_size: usize,
    pub flush_interval: Duration,
}

/// Worker loop: drain the shard, batch per stream, flush on size or tick.
///
/// When the shard sender side is dropped (shutdown), the receiver drains any
/// buffered entries first, then every remaining batch is force-flushed
/// before the task exits.
pub(crate) async fn run_worker(worker_id: usize, mut rx: mpsc::Receiver<LogEntry>, ctx: WorkerCtx) {
    let mut batches: HashMap<StreamId, (LabelSet, Vec<LogEntry>)> = HashMap::new();
    let mut ticker = interval(ctx.flush_interval);
    ticker.tick().await;

    tracing::debug!(worker_id, "Ingest worker started");

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(entry) => {
                    let labels = LabelSet::from_map(&entry.labels);
                    let stream_id = labels.stream_id();
                    let full = {
                        let (_, batch) = batches
                            .entry(stream_id.clone())
                            .or_insert_with(|| (labels, Vec::new()));
                        batch.push(entry);
                        batch.len() >= ctx.max_batch_size
                    };

                    if full {
                        if let Some((labels, batch)) = batches.remove(&stream_id) {
                            flush_batch(&ctx, &labels, batch).await;
                        }
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                flush_all(&ctx, &mut batches).await;
            }
        }
    }

    // Shutdown drain: whatever is still batched must reach disk.
    flush_all(&ctx, &mut batches).await;
    tracing::debug!(worker_id, "Ingest worker stopped");
}

async fn flush_all(ctx: &WorkerCtx, batches: &mut HashMap<StreamId, (LabelSet, Vec<LogEntry>)>) {
    for (_, (labels, batch)) in batches.drain() {
        flush_batch(ctx, &labels, batch).await;
    }
}

/// Write one batch, retrying a failed write once. A second failure drops the
/// batch: the per-stream failure counter and the global drop counter record
/// it, and the assigned ids are not reused.
async fn flush_batch(ctx: &WorkerCtx, labels: &LabelSet, batch: Vec<LogEntry>) {
    if batch.is_empty() {
        return;
    }

    let mut result = ctx.writer.write_chunk(labels, &batch).await;
    if result.is_err() {
        tracing::warn!(stream = %labels.canonical(), "Chunk write failed, retrying once");
        result = ctx.writer.write_chunk(labels, &batch).await;
    }

    match result {
        Ok((chunk_id, _, _)) => {
            ctx.index.register(labels).await;
            let count = batch.len() as u64;
            for entry in batch {
                ctx.hub.broadcast(entry);
            }
            ctx.ingested.fetch_add(count, Ordering::Relaxed);
            metrics::INGESTED_ENTRIES.inc_by(count);
            metrics::CHUNKS_WRITTEN.inc();
            tracing::debug!(chunk_id = %chunk_id, entries = count, "Batch flushed");
        }
        Err(e) => {
            let count = batch.len() as u64;
            tracing::warn!(
                stream = %labels.canonical(),
                entries = count,
                error = %e,
                "Dropping batch after repeated write failure"
            );
            if let Ok(mut failures) = ctx.write_failures.lock() {
                *failures.entry(labels.stream_id()).or_insert(0) += count;
            }
            ctx.dropped.fetch_add(count, Ordering::Relaxed);
            metrics::DROPPED_ENTRIES.inc_by(count);
        }
    }
}
