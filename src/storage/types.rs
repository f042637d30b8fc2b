//! Core data types for the loghive storage layer
//!
//! This module defines the fundamental types used throughout the crate:
//! - `LogEntry`: a single ingested log line with its label set
//! - `LabelSet`: a canonicalized label mapping whose identity names a stream
//! - `ChunkMeta`: the sidecar metadata written next to every chunk file
//! - `TimeRange`: a time interval for queries

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Identity of a stream: the canonical encoding of its label set.
///
/// The same string is used as the index key and as the stream's directory
/// name under the storage root.
pub type StreamId = String;

/// A single log entry
///
/// `id` is assigned at ingest from a monotonic counter and is strictly
/// increasing within a stream. `line` is an opaque UTF-8 payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub line: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl LogEntry {
    pub fn new(id: u64, timestamp: DateTime<Utc>, line: impl Into<String>) -> Self {
        Self {
            id,
            timestamp,
            line: line.into(),
            labels: HashMap::new(),
        }
    }

    /// Builder method: add a label
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Builder method: replace the full label map
    pub fn labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// The `level` label, if present (surfaced in stream frames)
    pub fn level(&self) -> &str {
        self.labels.get("level").map(String::as_str).unwrap_or("")
    }

    /// Timestamp rendered as RFC 3339 with nanosecond precision
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }
}

/// Maximum length of a label key in bytes
pub const MAX_LABEL_KEY_LEN: usize = 64;
/// Maximum length of a label value in bytes
pub const MAX_LABEL_VALUE_LEN: usize = 256;

/// Validate a single label pair for use as part of a stream identity.
///
/// Keys and values become path components and index keys, so the canonical
/// separators (`=`, `,`) and path separators are rejected outright.
pub fn validate_label(key: &str, value: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("label key cannot be empty".to_string());
    }
    if value.is_empty() {
        return Err(format!("label '{}' has an empty value", key));
    }
    if key.len() > MAX_LABEL_KEY_LEN {
        return Err(format!(
            "label key '{}' exceeds {} bytes",
            key, MAX_LABEL_KEY_LEN
        ));
    }
    if value.len() > MAX_LABEL_VALUE_LEN {
        return Err(format!(
            "value for label '{}' exceeds {} bytes",
            key, MAX_LABEL_VALUE_LEN
        ));
    }
    for (what, s) in [("key", key), ("value", value)] {
        if s.chars()
            .any(|c| matches!(c, '=' | ',' | '/' | '\\') || c.is_control())
        {
            return Err(format!("label {} '{}' contains a reserved character", what, s));
        }
        if s == ".." {
            return Err(format!("label {} may not be '..'", what));
        }
    }
    Ok(())
}

/// A canonicalized, immutable set of labels.
///
/// Canonical form: pairs sorted by key, rendered as `k=v` joined with `,`.
/// Two label sets are equal iff their canonical forms are byte-equal; the
/// canonical form doubles as the stream's directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelSet {
    labels: BTreeMap<String, String>,
    canonical: String,
}

impl LabelSet {
    /// Canonicalize an arbitrary label map
    pub fn from_map(labels: &HashMap<String, String>) -> Self {
        let sorted: BTreeMap<String, String> =
            labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let canonical = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        Self {
            labels: sorted,
            canonical,
        }
    }

    /// Parse a canonical `k=v,...` encoding back into a label set (used to
    /// restore the index from stream directory names at startup)
    pub fn from_canonical(canonical: &str) -> Option<Self> {
        if canonical.is_empty() {
            return None;
        }
        let mut labels = HashMap::new();
        for pair in canonical.split(',') {
            let (key, value) = pair.split_once('=')?;
            if key.is_empty() || value.is_empty() {
                return None;
            }
            labels.insert(key.to_string(), value.to_string());
        }
        Some(Self::from_map(&labels))
    }

    /// The canonical `k=v,...` encoding
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// The stream identity derived from this label set
    pub fn stream_id(&self) -> StreamId {
        self.canonical.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Copy back into an unordered map (for serialization boundaries)
    pub fn to_map(&self) -> HashMap<String, String> {
        self.labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Subset test: every pair in `filter` is present in `labels`.
///
/// An empty filter matches everything. This is the matching rule for both
/// live-stream subscriber filters and equality selectors.
pub fn labels_match(labels: &HashMap<String, String>, filter: &HashMap<String, String>) -> bool {
    filter
        .iter()
        .all(|(k, v)| labels.get(k).map(|lv| lv == v).unwrap_or(false))
}

/// Sidecar metadata written next to every chunk file.
///
/// The sidecar's existence is the commit marker: a data file without one is
/// treated as absent. Times are unix seconds, covering every entry in the
/// chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMeta {
    pub id: String,
    pub labels: HashMap<String, String>,
    pub start_time: i64,
    pub end_time: i64,
    pub entry_count: usize,
}

/// Time range for queries (inclusive on both ends)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a time range, returning None when start is after end
    pub fn try_new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        if start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// The last N hours up to now
    pub fn last_hours(hours: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::hours(hours),
            end,
        }
    }

    /// The last N minutes up to now
    pub fn last_minutes(minutes: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::minutes(minutes),
            end,
        }
    }

    /// Check if a timestamp falls within this range
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Check whether this range overlaps a chunk's second-granularity span
    pub fn overlaps_secs(&self, start_sec: i64, end_sec: i64) -> bool {
        end_sec >= self.start.timestamp() && start_sec <= self.end.timestamp()
    }
}
