//! Query routes
//!
//! - GET /query - selector query over a time window
//! - GET /labels - known label keys
//! - GET /labels/{name}/values - known values for one key

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::dto::{LogLine, QueryResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::parse_time;
use crate::api::state::AppState;
use crate::metrics;
use crate::storage::TimeRange;

/// Default result limit when the caller does not pass one
const DEFAULT_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub query: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: Option<String>,
}

/// GET /query
///
/// The default window is the last hour. `limit <= 0` means unlimited,
/// subject to the executor's hard ceiling.
pub async fn query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> ApiResult<Json<QueryResponse>> {
    let selector = params
        .query
        .ok_or_else(|| ApiError::Validation("query parameter is required".to_string()))?;

    let end = match params.end.as_deref() {
        Some(s) => parse_time(s).map_err(ApiError::TimeRange)?,
        None => chrono::Utc::now(),
    };
    let start = match params.start.as_deref() {
        Some(s) => parse_time(s).map_err(ApiError::TimeRange)?,
        None => end - chrono::Duration::hours(1),
    };

    let range = TimeRange::try_new(start, end)
        .ok_or_else(|| ApiError::TimeRange("start time must not be after end time".to_string()))?;

    let limit = match params.limit.as_deref() {
        Some(s) => s
            .parse::<i64>()
            .map_err(|_| ApiError::Validation(format!("invalid limit parameter: '{}'", s)))?,
        None => DEFAULT_LIMIT,
    };

    metrics::QUERIES_TOTAL.inc();
    let output = state.executor.execute(&selector, range, limit).await?;

    Ok(Json(QueryResponse {
        logs: output.entries.iter().map(LogLine::from_entry).collect(),
        stats: output.stats.into(),
    }))
}

/// GET /labels
pub async fn labels(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.index.label_keys().await)
}

/// GET /labels/{name}/values
pub async fn label_values(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<Vec<String>> {
    Json(state.index.values_of(&name).await)
}
