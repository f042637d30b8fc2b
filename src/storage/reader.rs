//! Chunk reader
//!
//! Enumerates candidate chunks for a set of streams via their sidecars and
//! stream-decodes entries that fall inside the query window. Chunks are
//! visited in (start_time, sequence) order per stream; entries within a
//! chunk come back in stored order, which equals insertion order.

use crate::storage::error::StorageResult;
use crate::storage::types::{ChunkMeta, LogEntry, StreamId, TimeRange};
use crate::storage::writer::parse_chunk_stem;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

/// Result of an enumeration pass
#[derive(Debug, Default)]
pub struct EnumerateOutcome {
    /// Entries inside the window, chunk order per stream
    pub entries: Vec<LogEntry>,
    /// Total lines decoded across all visited chunks
    pub scanned_lines: u64,
}

/// Reads sealed chunks from per-stream directories under a storage root
pub struct ChunkReader {
    base: PathBuf,
}

impl ChunkReader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Collect all in-window entries for the given streams.
    ///
    /// Only chunks whose sidecar span overlaps the window are opened. A data
    /// file that disappeared under us (retention race) reads as an empty
    /// chunk; a corrupt line skips the remainder of that chunk.
    pub fn enumerate(
        &self,
        stream_ids: &[StreamId],
        range: &TimeRange,
    ) -> StorageResult<EnumerateOutcome> {
        let mut outcome = EnumerateOutcome::default();

        for stream_id in stream_ids {
            let dir = self.base.join(stream_id);
            if !dir.exists() {
                continue;
            }

            for meta in self.candidate_chunks(&dir, range)? {
                let chunk_path = dir.join(format!("{}.log", meta.id));
                self.read_chunk(&chunk_path, range, &mut outcome);
            }
        }

        Ok(outcome)
    }

    /// Sidecars in the stream directory whose span overlaps the window,
    /// ordered by (start_time, sequence)
    fn candidate_chunks(&self, dir: &Path, range: &TimeRange) -> StorageResult<Vec<ChunkMeta>> {
        let mut chunks = Vec::new();

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(chunks),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.extension().map(|e| e == "meta").unwrap_or(false) {
                continue;
            }

            let meta: ChunkMeta = match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
            {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Skipping unreadable sidecar");
                    continue;
                }
            };

            if range.overlaps_secs(meta.start_time, meta.end_time) {
                chunks.push(meta);
            }
        }

        chunks.sort_by_key(|m| {
            let seq = parse_chunk_stem(&m.id).map(|(_, seq)| seq).unwrap_or(0);
            (m.start_time, seq)
        });

        Ok(chunks)
    }

    fn read_chunk(&self, path: &Path, range: &TimeRange, outcome: &mut EnumerateOutcome) {
        let file = match File::open(path) {
            Ok(file) => file,
            // Deleted by retention mid-query: treat as end-of-chunk.
            Err(e) if e.kind() == ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Failed to open chunk");
                return;
            }
        };

        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Read error, skipping rest of chunk");
                    return;
                }
            };
            if line.is_empty() {
                continue;
            }

            outcome.scanned_lines += 1;

            let entry: LogEntry = match serde_json::from_str(&line) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Corrupt entry, skipping rest of chunk");
                    return;
                }
            };

            if range.contains(entry.timestamp) {
                outcome.entries.push(entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::LabelSet;
    use crate::storage::writer::ChunkWriter;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LabelSet::from_map(&map)
    }

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let writer = ChunkWriter::new(dir.path()).unwrap();
        let reader = ChunkReader::new(dir.path());

        let ls = labels(&[("service", "api")]);
        let now = Utc::now();
        let written: Vec<LogEntry> = (0..10)
            .map(|i| {
                LogEntry::new(i + 1, now + Duration::milliseconds(i as i64), format!("line {}", i))
                    .label("service", "api")
            })
            .collect();

        writer.write_chunk(&ls, &written).await.unwrap();

        let range = TimeRange::last_hours(1);
        let outcome = reader.enumerate(&[ls.stream_id()], &range).unwrap();

        assert_eq!(outcome.entries, written);
        assert_eq!(outcome.scanned_lines, 10);
    }

    #[tokio::test]
    async fn test_window_excludes_out_of_range_entries() {
        let dir = tempdir().unwrap();
        let writer = ChunkWriter::new(dir.path()).unwrap();
        let reader = ChunkReader::new(dir.path());

        let ls = labels(&[("service", "api")]);
        let now = Utc::now();
        let old = now - Duration::hours(3);

        let written = vec![
            LogEntry::new(1, old, "old").label("service", "api"),
            LogEntry::new(2, now, "recent").label("service", "api"),
        ];
        writer.write_chunk(&ls, &written).await.unwrap();

        let range = TimeRange::last_hours(1);
        let outcome = reader.enumerate(&[ls.stream_id()], &range).unwrap();

        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].line, "recent");
        // Both lines were decoded even though only one matched.
        assert_eq!(outcome.scanned_lines, 2);
    }

    #[tokio::test]
    async fn test_chunks_without_sidecar_invisible() {
        let dir = tempdir().unwrap();
        let reader = ChunkReader::new(dir.path());

        let stream_dir = dir.path().join("service=api");
        fs::create_dir_all(&stream_dir).unwrap();
        fs::write(stream_dir.join("chunk_1700000000_1.log"), b"{}\n").unwrap();

        let range = TimeRange::last_hours(1);
        let outcome = reader
            .enumerate(&["service=api".to_string()], &range)
            .unwrap();
        assert!(outcome.entries.is_empty());
        assert_eq!(outcome.scanned_lines, 0);
    }

    #[tokio::test]
    async fn test_missing_stream_dir_is_empty() {
        let dir = tempdir().unwrap();
        let reader = ChunkReader::new(dir.path());

        let range = TimeRange::last_hours(1);
        let outcome = reader
            .enumerate(&["service=ghost".to_string()], &range)
            .unwrap();
        assert!(outcome.entries.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_chunk_skipped() {
        let dir = tempdir().unwrap();
        let writer = ChunkWriter::new(dir.path()).unwrap();
        let reader = ChunkReader::new(dir.path());

        let ls = labels(&[("service", "api")]);
        let now = Utc::now();

        let (chunk_id, _, _) = writer
            .write_chunk(&ls, &[LogEntry::new(1, now, "good").label("service", "api")])
            .await
            .unwrap();

        // Append garbage to the sealed chunk to simulate corruption.
        let chunk_path = dir.path().join("service=api").join(format!("{}.log", chunk_id));
        let mut content = fs::read(&chunk_path).unwrap();
        content.extend_from_slice(b"not json\n");
        fs::write(&chunk_path, content).unwrap();

        // Second, healthy chunk must still be read.
        writer
            .write_chunk(&ls, &[LogEntry::new(2, now, "after").label("service", "api")])
            .await
            .unwrap();

        let range = TimeRange::last_hours(1);
        let outcome = reader.enumerate(&[ls.stream_id()], &range).unwrap();

        let lines: Vec<&str> = outcome.entries.iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, vec!["good", "after"]);
    }

    #[tokio::test]
    async fn test_entries_ordered_across_chunks() {
        let dir = tempdir().unwrap();
        let writer = ChunkWriter::new(dir.path()).unwrap();
        let reader = ChunkReader::new(dir.path());

        let ls = labels(&[("service", "api")]);
        let now = Utc::now();

        for batch in 0..3u64 {
            let entries: Vec<LogEntry> = (0..5)
                .map(|i| {
                    let id = batch * 5 + i + 1;
                    LogEntry::new(id, now + Duration::milliseconds(id as i64), format!("l{}", id))
                        .label("service", "api")
                })
                .collect();
            writer.write_chunk(&ls, &entries).await.unwrap();
        }

        let range = TimeRange::last_hours(1);
        let outcome = reader.enumerate(&[ls.stream_id()], &range).unwrap();

        let ids: Vec<u64> = outcome.entries.iter().map(|e| e.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), 15);
    }
}
