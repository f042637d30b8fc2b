//! Label index
//!
//! In-memory mapping from labels to stream identities, rebuilt from sidecars
//! at startup and kept current by the ingest workers. Three relations:
//!
//! - label key → set of values
//! - (key, value) → set of stream ids
//! - stream id → label set
//!
//! All three are updated atomically with respect to a single `register`
//! call; snapshots handed out by the read paths are copies.

use crate::query::ast::Matcher;
use crate::storage::types::{LabelSet, StreamId};
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct IndexInner {
    /// label key → known values
    values: HashMap<String, BTreeSet<String>>,
    /// (key, value) → streams carrying that pair
    streams_by_pair: HashMap<(String, String), HashSet<StreamId>>,
    /// stream id → its full label set
    labels_by_stream: HashMap<StreamId, LabelSet>,
}

/// In-memory label index supporting selector resolution
pub struct LabelIndex {
    inner: RwLock<IndexInner>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(IndexInner::default()),
        }
    }

    /// Register a label set, returning its stream id. Idempotent.
    pub async fn register(&self, labels: &LabelSet) -> StreamId {
        let stream_id = labels.stream_id();

        let mut inner = self.inner.write().await;
        if inner.labels_by_stream.contains_key(&stream_id) {
            return stream_id;
        }

        for (key, value) in labels.iter() {
            inner
                .values
                .entry(key.clone())
                .or_default()
                .insert(value.clone());
            inner
                .streams_by_pair
                .entry((key.clone(), value.clone()))
                .or_default()
                .insert(stream_id.clone());
        }
        inner.labels_by_stream.insert(stream_id.clone(), labels.clone());

        tracing::debug!(stream = %stream_id, "Registered new stream");
        stream_id
    }

    /// Known label keys, lexicographic
    pub async fn label_keys(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut keys: Vec<String> = inner.values.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Known values for a key, lexicographic. Unknown keys yield an empty
    /// list.
    pub async fn values_of(&self, key: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .values
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Label set for a registered stream
    pub async fn labels_of(&self, stream_id: &str) -> Option<LabelSet> {
        let inner = self.inner.read().await;
        inner.labels_by_stream.get(stream_id).cloned()
    }

    /// Number of known streams
    pub async fn stream_count(&self) -> usize {
        self.inner.read().await.labels_by_stream.len()
    }

    /// Rebuild the index from the stream directories under a storage root.
    ///
    /// Directory names are canonical label encodings; anything that does not
    /// parse is skipped with a warning. Returns the number of streams
    /// restored.
    pub async fn restore_from_disk(&self, base: &std::path::Path) -> usize {
        let entries = match std::fs::read_dir(base) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut restored = 0;
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };

            match LabelSet::from_canonical(name) {
                Some(labels) => {
                    self.register(&labels).await;
                    restored += 1;
                }
                None => {
                    tracing::warn!(dir = %name, "Skipping unparseable stream directory");
                }
            }
        }

        if restored > 0 {
            tracing::info!(streams = restored, "Restored label index from disk");
        }
        restored
    }

    /// Resolve a selector to the set of candidate stream ids.
    ///
    /// Equality pairs intersect their `(key, value)` stream sets; regex
    /// matchers union the sets of every known value of the key that the
    /// pattern matches, then intersect with the accumulator. Negative
    /// matchers do not narrow the stream set here (the executor applies them
    /// per entry). An empty selector resolves to all known streams.
    pub async fn resolve(&self, matchers: &[Matcher]) -> Vec<StreamId> {
        let inner = self.inner.read().await;

        let mut acc: Option<HashSet<StreamId>> = None;

        for matcher in matchers.iter().filter(|m| m.is_positive()) {
            let candidate: HashSet<StreamId> = if let Some(re) = matcher.pattern() {
                let mut union = HashSet::new();
                if let Some(values) = inner.values.get(&matcher.key) {
                    for value in values {
                        if re.is_match(value) {
                            if let Some(streams) = inner
                                .streams_by_pair
                                .get(&(matcher.key.clone(), value.clone()))
                            {
                                union.extend(streams.iter().cloned());
                            }
                        }
                    }
                }
                union
            } else {
                inner
                    .streams_by_pair
                    .get(&(matcher.key.clone(), matcher.value.clone()))
                    .cloned()
                    .unwrap_or_default()
            };

            acc = Some(match acc {
                Some(existing) => existing.intersection(&candidate).cloned().collect(),
                None => candidate,
            });

            if acc.as_ref().map(|s| s.is_empty()).unwrap_or(false) {
                return Vec::new();
            }
        }

        match acc {
            Some(set) => set.into_iter().collect(),
            // No positive matchers: start from every known stream.
            None => inner.labels_by_stream.keys().cloned().collect(),
        }
    }
}

impl Default for LabelIndex {
    fn default() -> Self {
        Self::new()
    }
}
