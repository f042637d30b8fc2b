//! Query executor
//!
//! Resolves a selector against the label index, materializes matching
//! entries from chunks, applies the full matcher set per entry, then sorts
//! and limits the result.

use crate::index::LabelIndex;
use crate::query::ast::Matcher;
use crate::query::error::{QueryError, QueryResult};
use crate::query::parser::parse_selector;
use crate::storage::{ChunkReader, LogEntry, TimeRange};
use std::sync::Arc;
use std::time::Instant;

/// Hard ceiling on returned entries, applied even to "unlimited" queries
pub const MAX_QUERY_LIMIT: usize = 10_000;

/// Execution statistics reported alongside results
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStats {
    /// Lines decoded from chunks during enumeration
    pub scanned_lines: u64,
    /// Entries that matched the selector inside the window
    pub matched_lines: u64,
    /// Wall-clock execution time in milliseconds
    pub execution_time_ms: f64,
}

/// Result of a query execution
#[derive(Debug)]
pub struct QueryOutput {
    pub entries: Vec<LogEntry>,
    pub stats: QueryStats,
}

/// Executes selector queries over the index and chunk store
pub struct QueryExecutor {
    index: Arc<LabelIndex>,
    reader: Arc<ChunkReader>,
}

impl QueryExecutor {
    pub fn new(index: Arc<LabelIndex>, reader: Arc<ChunkReader>) -> Self {
        Self { index, reader }
    }

    /// Run `selector` over `range`, returning at most `limit` entries sorted
    /// by `(timestamp, id)` ascending. `limit <= 0` means unlimited, bounded
    /// by [`MAX_QUERY_LIMIT`].
    pub async fn execute(
        &self,
        selector: &str,
        range: TimeRange,
        limit: i64,
    ) -> QueryResult<QueryOutput> {
        let started = Instant::now();

        let matchers = parse_selector(selector)?;
        let stream_ids = self.index.resolve(&matchers).await;

        if stream_ids.is_empty() {
            return Ok(QueryOutput {
                entries: Vec::new(),
                stats: QueryStats {
                    scanned_lines: 0,
                    matched_lines: 0,
                    execution_time_ms: elapsed_ms(started),
                },
            });
        }

        let outcome = self.reader.enumerate(&stream_ids, &range)?;
        let scanned_lines = outcome.scanned_lines;

        let mut entries: Vec<LogEntry> = outcome
            .entries
            .into_iter()
            .filter(|entry| entry_matches(entry, &matchers))
            .collect();
        let matched_lines = entries.len() as u64;

        entries.sort_by_key(|e| (e.timestamp, e.id));

        let effective_limit = if limit <= 0 {
            MAX_QUERY_LIMIT
        } else {
            (limit as usize).min(MAX_QUERY_LIMIT)
        };
        entries.truncate(effective_limit);

        Ok(QueryOutput {
            entries,
            stats: QueryStats {
                scanned_lines,
                matched_lines,
                execution_time_ms: elapsed_ms(started),
            },
        })
    }
}

fn entry_matches(entry: &LogEntry, matchers: &[Matcher]) -> bool {
    matchers.iter().all(|m| m.matches(&entry.labels))
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Convert the time-range arguments of a query, failing with a
/// [`QueryError::TimeRange`] when start is after end.
pub fn validate_range(
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
) -> QueryResult<TimeRange> {
    TimeRange::try_new(start, end)
        .ok_or_else(|| QueryError::TimeRange("start time must not be after end time".to_string()))
}
