//! Query error types
//!
//! Defines all error conditions that can occur while building, submitting
//! and paging through queries.

use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Filter operator is not in the allowed set
    #[error("Invalid operator '{operator}'. Must be one of: {allowed}")]
    InvalidOperator { operator: String, allowed: String },

    /// Filter target is not a field reference
    #[error("Filter field must be a field reference, got raw identifier '{0}'")]
    InvalidFieldType(String),

    /// A filter group contains a nested group
    #[error("Multi-level filter composites are not supported")]
    UnsupportedComposite,

    /// Two filters in one group target the same field
    #[error("Multiple filters for field {0} are not supported")]
    DuplicateFieldFilter(String),

    /// Row limit outside 1..=50000
    #[error("Limit must be between 1 and 50000, got {0}")]
    InvalidLimit(u32),

    /// Query is not attached to a client
    #[error("Explore '{0}' is not bound to a client")]
    NotBound(String),

    /// Server reported the job as failed
    #[error("Query {job_id} failed: {message}")]
    QueryFailed { job_id: String, message: String },

    /// Server reported the job as cancelled
    #[error("Query {job_id} was cancelled")]
    QueryCancelled { job_id: String },

    /// Job did not finish before the polling deadline
    #[error("Query {job_id} did not complete within {}s", .timeout.as_secs_f64())]
    QueryTimedOut { job_id: String, timeout: Duration },

    /// Catalog lookup missed
    #[error("No {kind} named '{name}' found{}", format_suggestions(.suggestions))]
    UnknownEntity {
        kind: &'static str,
        name: String,
        suggestions: Vec<String>,
    },

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Server response did not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Decode(err.to_string())
    }
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        return String::new();
    }
    let quoted: Vec<String> = suggestions.iter().map(|s| format!("'{}'", s)).collect();
    format!(". Did you mean: {}?", quoted.join(", "))
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
