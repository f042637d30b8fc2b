//! Query error types

use thiserror::Error;

/// Errors that can occur during selector parsing and query execution
#[derive(Error, Debug)]
pub enum QueryError {
    /// Selector could not be parsed
    #[error("invalid query syntax: {0}")]
    Syntax(String),

    /// A regex matcher failed to compile
    #[error("invalid regex pattern: {0}")]
    Regex(String),

    /// Invalid time range (start after end, or unparseable)
    #[error("invalid time range: {0}")]
    TimeRange(String),

    /// Storage layer error
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
