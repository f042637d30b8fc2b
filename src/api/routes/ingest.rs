//! Ingest route
//!
//! POST /ingest accepts `{streams: [{labels, entries: [{ts, line}]}]}` and
//! hands each stream to the ingest pipeline. The response is an optimistic
//! accept: persistence happens asynchronously in the batchers.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use crate::api::dto::{IngestRequest, IngestResponse, TimeInput};
use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::parse_time;
use crate::api::state::AppState;
use crate::ingest::{IncomingEntry, Ingestor};

/// POST /ingest
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let Json(req) = payload.map_err(|e| ApiError::Json(e.body_text()))?;

    if req.streams.is_empty() {
        return Err(ApiError::Validation("streams cannot be empty".to_string()));
    }

    // Parse and validate every stream before anything is enqueued: a bad
    // stream anywhere in the request must have no side effects.
    let mut batches = Vec::with_capacity(req.streams.len());
    for stream in req.streams {
        let entries = stream
            .entries
            .into_iter()
            .map(|entry| {
                Ok(IncomingEntry {
                    timestamp: parse_entry_time(entry.ts)?,
                    line: entry.line,
                })
            })
            .collect::<ApiResult<Vec<_>>>()?;

        Ingestor::validate_batch(&stream.labels, &entries)?;
        batches.push((stream.labels, entries));
    }

    // Enqueue phase. A full or closing buffer can still fail mid-request;
    // report how much of the request was already accepted (earlier streams
    // plus the failed stream's partial batch) rather than discarding the
    // count.
    let mut accepted = 0;
    for (labels, entries) in batches {
        match state.ingestor.accept(&labels, entries) {
            Ok(n) => accepted += n,
            Err(e) => {
                let total = accepted + e.accepted();
                return Err(ApiError::ingest_failure(e, total));
            }
        }
    }

    Ok((StatusCode::ACCEPTED, Json(IngestResponse { accepted })))
}

fn parse_entry_time(ts: Option<TimeInput>) -> ApiResult<Option<DateTime<Utc>>> {
    match ts {
        None => Ok(None),
        Some(TimeInput::Nanos(ns)) => Ok(Some(Utc.timestamp_nanos(ns))),
        Some(TimeInput::Text(s)) => parse_time(&s)
            .map(Some)
            .map_err(|e| ApiError::Validation(format!("invalid entry timestamp: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry_time() {
        assert!(parse_entry_time(None).unwrap().is_none());

        let ts = parse_entry_time(Some(TimeInput::Nanos(1_705_314_600_000_000_000)))
            .unwrap()
            .unwrap();
        assert_eq!(ts.timestamp(), 1_705_314_600);

        let ts = parse_entry_time(Some(TimeInput::Text("2024-01-15T10:30:00Z".to_string())))
            .unwrap()
            .unwrap();
        assert_eq!(ts.timestamp(), 1_705_314_600);

        assert!(parse_entry_time(Some(TimeInput::Text("bogus".to_string()))).is_err());
    }
}
