//! API error types
//!
//! Converts layer errors into HTTP responses with the wire shape
//! `{"error": "...", "code": "...", "details": "..."}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ingest::IngestError;
use crate::query::QueryError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body was not valid JSON
    #[error("invalid JSON: {0}")]
    Json(String),

    /// Selector parsing or query execution error
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Invalid time range in request parameters
    #[error("invalid time range: {0}")]
    TimeRange(String),

    /// Ingest pipeline rejected the payload. `accepted` counts entries
    /// from the same request that were already enqueued before the
    /// failure, so partial ingestion is never silent.
    #[error("ingestion error: {source}")]
    Ingest { source: IngestError, accepted: usize },

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Wrap an ingest failure, recording how many entries of the request
    /// had already been accepted
    pub fn ingest_failure(err: IngestError, accepted: usize) -> Self {
        match err {
            IngestError::Validation(msg) => ApiError::Validation(msg),
            source => ApiError::Ingest { source, accepted },
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError::ingest_failure(err, 0)
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Json(_) => (StatusCode::BAD_REQUEST, "INVALID_JSON"),
            ApiError::Query(QueryError::Syntax(_)) => (StatusCode::BAD_REQUEST, "BAD_QUERY"),
            ApiError::Query(QueryError::Regex(_)) => (StatusCode::BAD_REQUEST, "INVALID_REGEX"),
            ApiError::Query(QueryError::TimeRange(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_TIME_RANGE")
            }
            ApiError::Query(QueryError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
            ApiError::TimeRange(_) => (StatusCode::BAD_REQUEST, "INVALID_TIME_RANGE"),
            ApiError::Ingest {
                source: IngestError::BufferFull { .. },
                ..
            } => (StatusCode::TOO_MANY_REQUESTS, "INGESTION_ERROR"),
            ApiError::Ingest { .. } => (StatusCode::SERVICE_UNAVAILABLE, "INGESTION_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn message(&self) -> (String, Option<String>) {
        match self {
            ApiError::Query(QueryError::Syntax(details)) => {
                ("Invalid query syntax".to_string(), Some(details.clone()))
            }
            ApiError::Query(QueryError::Regex(details)) => {
                ("Invalid regex pattern".to_string(), Some(details.clone()))
            }
            ApiError::Query(QueryError::TimeRange(details)) | ApiError::TimeRange(details) => {
                ("Invalid time range".to_string(), Some(details.clone()))
            }
            ApiError::Ingest { source, accepted } => {
                let details = if *accepted > 0 {
                    Some(format!(
                        "{} entries from this request were accepted before the failure",
                        accepted
                    ))
                } else {
                    None
                };
                (source.to_string(), details)
            }
            other => (other.to_string(), None),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let (error, details) = self.message();

        if status.is_server_error() {
            tracing::error!(code, error = %self, "API error");
        } else {
            tracing::debug!(code, error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error,
            code: code.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let cases = [
            (
                ApiError::Query(QueryError::Syntax("x".into())),
                StatusCode::BAD_REQUEST,
                "BAD_QUERY",
            ),
            (
                ApiError::Query(QueryError::Regex("x".into())),
                StatusCode::BAD_REQUEST,
                "INVALID_REGEX",
            ),
            (
                ApiError::TimeRange("x".into()),
                StatusCode::BAD_REQUEST,
                "INVALID_TIME_RANGE",
            ),
            (
                ApiError::Validation("x".into()),
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
            ),
            (
                ApiError::ingest_failure(IngestError::BufferFull { accepted: 0 }, 0),
                StatusCode::TOO_MANY_REQUESTS,
                "INGESTION_ERROR",
            ),
            (
                ApiError::ingest_failure(IngestError::ShuttingDown { accepted: 0 }, 0),
                StatusCode::SERVICE_UNAVAILABLE,
                "INGESTION_ERROR",
            ),
            (
                ApiError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];

        for (err, status, code) in cases {
            let (s, c) = err.status_and_code();
            assert_eq!(s, status);
            assert_eq!(c, code);
        }
    }

    #[test]
    fn test_ingest_validation_maps_to_validation_error() {
        let err: ApiError = IngestError::Validation("bad".into()).into();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_partial_accept_reported_in_details() {
        let err = ApiError::ingest_failure(IngestError::BufferFull { accepted: 1 }, 3);
        let (_, details) = err.message();
        assert_eq!(
            details.as_deref(),
            Some("3 entries from this request were accepted before the failure")
        );

        // No accepted work, no details.
        let err = ApiError::ingest_failure(IngestError::BufferFull { accepted: 0 }, 0);
        let (_, details) = err.message();
        assert!(details.is_none());
    }
}
