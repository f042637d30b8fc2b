//! Live-stream wire frames
//!
//! JSON messages exchanged with WebSocket subscribers. Log frames carry the
//! shape `{"type":"log","data":{...}}`; clients may push filter updates as
//! `{"type":"filter","labels":{...}}`.

use crate::storage::LogEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Messages sent from server to subscriber
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A newly ingested log entry matching the subscriber's filter
    Log { data: LogEvent },
    /// Connection established
    Connected {
        message: String,
        filter: HashMap<String, String>,
    },
    /// Filter replacement confirmed
    FilterUpdated { filter: HashMap<String, String> },
    /// Error notification (connection stays open)
    Error { message: String },
    /// Health ping, mapped to a WebSocket ping control frame
    Ping,
}

/// Payload of a log frame
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub id: u64,
    pub timestamp: String,
    pub message: String,
    pub labels: HashMap<String, String>,
    pub level: String,
}

impl LogEvent {
    pub fn from_entry(entry: &LogEntry) -> Self {
        Self {
            id: entry.id,
            timestamp: entry.timestamp_rfc3339(),
            message: entry.line.clone(),
            labels: entry.labels.clone(),
            level: entry.level().to_string(),
        }
    }
}

/// Messages accepted from subscribers
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Replace the subscriber's label filter
    Filter { labels: HashMap<String, String> },
    /// Keepalive
    Ping,
}
