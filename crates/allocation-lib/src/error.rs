//! Error types for the cost allocation pipeline.
//!
//! Metrics-side failures name the metric being queried, storage-side
//! failures name the statement and the record being written.

use crate::models::IdentityKey;
use crate::source::Metric;
use thiserror::Error;

/// Result type alias for allocation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the allocation pipeline.
#[derive(Error, Debug)]
pub enum Error {
    // Metrics backend errors
    #[error("Failed to create metrics client: {reason}")]
    ClientCreationFailed { reason: String },

    #[error("Query for required {metric} failed: {reason}")]
    QueryFailed { metric: Metric, reason: String },

    #[error("Query for required {metric} returned result type '{result_type}', expected 'vector'")]
    UnexpectedResultType { metric: Metric, result_type: String },

    // Aggregation errors
    #[error("Required {metric} sample for {key} has no matching replica sample")]
    AggregationInconsistency { metric: Metric, key: IdentityKey },

    // Storage errors
    #[error("Database connection unavailable: {reason}")]
    ConnectionUnavailable { reason: String },

    #[error("Failed to {statement} ({context}): {source}")]
    StatementFailed {
        statement: &'static str,
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Run has not been persisted yet, resources cannot reference it")]
    RunNotPersisted,

    #[error("Database migration failed: {reason}")]
    Migration { reason: String },
}

impl Error {
    /// Build a `StatementFailed` mapper for use with `map_err`.
    pub(crate) fn statement(
        statement: &'static str,
        context: impl Into<String>,
    ) -> impl FnOnce(sqlx::Error) -> Error {
        let context = context.into();
        move |source| Error::StatementFailed {
            statement,
            context,
            source,
        }
    }

    /// Returns true for errors raised by the metrics backend.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            Error::ClientCreationFailed { .. }
                | Error::QueryFailed { .. }
                | Error::UnexpectedResultType { .. }
        )
    }
}
