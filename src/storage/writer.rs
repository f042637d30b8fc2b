//! Chunk writer
//!
//! Writes one sealed chunk per (label set, batch): a newline-delimited JSON
//! data file plus a `.meta` JSON sidecar in the stream's directory. The data
//! file is fully written, flushed and synced before the sidecar is created;
//! the sidecar's existence is the commit marker. Chunks are never reopened.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{ChunkMeta, LabelSet, LogEntry, StreamId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Parse `chunk_<unixSec>_<seq>` from a chunk file stem
pub(crate) fn parse_chunk_stem(stem: &str) -> Option<(i64, u64)> {
    let rest = stem.strip_prefix("chunk_")?;
    let (sec, seq) = rest.split_once('_')?;
    Some((sec.parse().ok()?, seq.parse().ok()?))
}

/// Writes sealed chunks to per-stream directories under a storage root
pub struct ChunkWriter {
    base: PathBuf,
    /// Monotonic sequence, seeded from the highest sequence found on disk
    chunk_seq: AtomicU64,
    /// Per-stream creation locks so chunk files within a directory are
    /// created in sequence order; cross-stream writes stay parallel
    dir_locks: Mutex<HashMap<StreamId, Arc<Mutex<()>>>>,
}

impl ChunkWriter {
    /// Open a writer rooted at `base`, creating the directory if needed.
    ///
    /// Startup recovery removes orphan `.log` files that have no sidecar
    /// (a crash between data write and sidecar creation) and seeds the
    /// chunk sequence past anything already on disk.
    pub fn new(base: impl Into<PathBuf>) -> StorageResult<Self> {
        let base = base.into();
        fs::create_dir_all(&base)?;

        let mut max_seq = 0u64;
        let mut orphans = Vec::new();
        visit_files(&base, &mut |path| {
            if path.extension().map(|e| e == "log").unwrap_or(false) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if let Some((_, seq)) = parse_chunk_stem(stem) {
                        max_seq = max_seq.max(seq);
                    }
                    if !path.with_extension("meta").exists() {
                        orphans.push(path.to_path_buf());
                    }
                }
            }
        })?;

        for orphan in &orphans {
            if let Err(e) = fs::remove_file(orphan) {
                tracing::warn!(path = ?orphan, error = %e, "Failed to remove orphan chunk");
            }
        }
        if !orphans.is_empty() {
            tracing::info!(count = orphans.len(), "Removed orphan chunks without sidecars");
        }

        Ok(Self {
            base,
            chunk_seq: AtomicU64::new(max_seq),
            dir_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Storage root path
    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Write a batch of entries as a new sealed chunk for one stream.
    ///
    /// Returns the chunk id and the time span covered by the batch. The
    /// whole batch fails atomically: on error no partial chunk remains
    /// visible (a data file without a sidecar is removed).
    pub async fn write_chunk(
        &self,
        labels: &LabelSet,
        entries: &[LogEntry],
    ) -> StorageResult<(String, DateTime<Utc>, DateTime<Utc>)> {
        if entries.is_empty() {
            return Err(StorageError::EmptyBatch);
        }

        let seq = self.chunk_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let chunk_id = format!("chunk_{}_{}", Utc::now().timestamp(), seq);

        let dir = self.base.join(labels.canonical());
        fs::create_dir_all(&dir)?;

        let chunk_path = dir.join(format!("{}.log", chunk_id));
        let meta_path = dir.join(format!("{}.meta", chunk_id));

        let start = entries
            .iter()
            .map(|e| e.timestamp)
            .min()
            .ok_or(StorageError::EmptyBatch)?;
        let end = entries
            .iter()
            .map(|e| e.timestamp)
            .max()
            .ok_or(StorageError::EmptyBatch)?;

        let lock = self.stream_lock(labels.canonical()).await;
        let _guard = lock.lock().await;

        if let Err(e) = write_data_file(&chunk_path, entries) {
            let _ = fs::remove_file(&chunk_path);
            return Err(e);
        }

        let meta = ChunkMeta {
            id: chunk_id.clone(),
            labels: labels.to_map(),
            start_time: start.timestamp(),
            end_time: end.timestamp(),
            entry_count: entries.len(),
        };

        if let Err(e) = write_meta_file(&meta_path, &meta) {
            let _ = fs::remove_file(&meta_path);
            let _ = fs::remove_file(&chunk_path);
            return Err(e);
        }

        tracing::debug!(
            chunk_id = %chunk_id,
            stream = %labels.canonical(),
            entries = entries.len(),
            "Sealed chunk"
        );

        Ok((chunk_id, start, end))
    }

    /// Total bytes under the storage root
    pub fn storage_size(&self) -> u64 {
        let mut size = 0u64;
        let _ = visit_files(&self.base, &mut |path| {
            if let Ok(meta) = fs::metadata(path) {
                size += meta.len();
            }
        });
        size
    }

    /// Number of sealed chunks under the storage root
    pub fn chunk_count(&self) -> usize {
        let mut count = 0usize;
        let _ = visit_files(&self.base, &mut |path| {
            if path.extension().map(|e| e == "log").unwrap_or(false) {
                count += 1;
            }
        });
        count
    }

    async fn stream_lock(&self, stream: &str) -> Arc<Mutex<()>> {
        let mut locks = self.dir_locks.lock().await;
        locks
            .entry(stream.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn write_data_file(path: &Path, entries: &[LogEntry]) -> StorageResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    for entry in entries {
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
    }

    writer.flush()?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(())
}

fn write_meta_file(path: &Path, meta: &ChunkMeta) -> StorageResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, meta)?;
    writer.flush()?;
    Ok(())
}

/// Walk every regular file under `root`, depth-first
pub(crate) fn visit_files(root: &Path, f: &mut dyn FnMut(&Path)) -> std::io::Result<()> {
    if !root.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            visit_files(&path, f)?;
        } else {
            f(&path);
        }
    }
    Ok(())
}
