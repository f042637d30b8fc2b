//! API request and response bodies

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::query::QueryStats;
use crate::storage::LogEntry;

/// POST /ingest request body
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub streams: Vec<IngestStream>,
}

/// One labeled stream of entries in an ingest payload
#[derive(Debug, Deserialize)]
pub struct IngestStream {
    pub labels: HashMap<String, String>,
    pub entries: Vec<IngestEntry>,
}

/// One entry; `ts` accepts unix nanoseconds or RFC 3339, defaults to now
#[derive(Debug, Deserialize)]
pub struct IngestEntry {
    #[serde(default)]
    pub ts: Option<TimeInput>,
    pub line: String,
}

/// Timestamp as supplied on the wire
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimeInput {
    Nanos(i64),
    Text(String),
}

/// POST /ingest response body
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
}

/// GET /query response body
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub logs: Vec<LogLine>,
    pub stats: QueryStatsDto,
}

/// One matched log line
#[derive(Debug, Serialize)]
pub struct LogLine {
    pub id: u64,
    pub timestamp: String,
    pub line: String,
    pub labels: HashMap<String, String>,
}

impl LogLine {
    pub fn from_entry(entry: &LogEntry) -> Self {
        Self {
            id: entry.id,
            timestamp: entry.timestamp_rfc3339(),
            line: entry.line.clone(),
            labels: entry.labels.clone(),
        }
    }
}

/// Query statistics as exposed on the wire
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatsDto {
    pub scanned_lines: u64,
    pub matched_lines: u64,
    /// Execution time in milliseconds
    pub execution_time: f64,
}

impl From<QueryStats> for QueryStatsDto {
    fn from(stats: QueryStats) -> Self {
        Self {
            scanned_lines: stats.scanned_lines,
            matched_lines: stats.matched_lines,
            execution_time: stats.execution_time_ms,
        }
    }
}

/// GET /health response body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub streams: usize,
    pub ingest: IngestCounters,
    pub hub: HubCounters,
    pub storage: StorageCounters,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct IngestCounters {
    pub ingested: u64,
    pub dropped: u64,
    pub failed_streams: usize,
}

#[derive(Debug, Serialize)]
pub struct HubCounters {
    pub clients: usize,
    pub dropped: u64,
}

#[derive(Debug, Serialize)]
pub struct StorageCounters {
    pub chunks: usize,
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_request_parses_both_time_forms() {
        let json = r#"{
            "streams": [{
                "labels": {"service": "api"},
                "entries": [
                    {"ts": "2024-01-15T10:30:00Z", "line": "rfc3339"},
                    {"ts": 1705314600000000000, "line": "nanos"},
                    {"line": "no ts"}
                ]
            }]
        }"#;

        let req: IngestRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.streams.len(), 1);
        let entries = &req.streams[0].entries;
        assert!(matches!(entries[0].ts, Some(TimeInput::Text(_))));
        assert!(matches!(entries[1].ts, Some(TimeInput::Nanos(_))));
        assert!(entries[2].ts.is_none());
    }

    #[test]
    fn test_stats_camel_case() {
        let dto = QueryStatsDto {
            scanned_lines: 10,
            matched_lines: 3,
            execution_time: 1.5,
        };
        let json = serde_json::to_string(&dto).unwrap();
        assert!(json.contains("\"scannedLines\":10"));
        assert!(json.contains("\"matchedLines\":3"));
        assert!(json.contains("\"executionTime\":1.5"));
    }
}
