//! Relational source error types.

use thiserror::Error;

/// Errors that can occur while extracting changed records from the relational store.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The database could not be reached or the connection dropped mid-query.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The database rejected the query.
    #[error("Query error: {0}")]
    Query(String),

    /// A row could not be mapped into a movie record.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),
}

impl SourceError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a data integrity error.
    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    /// Whether retrying the same extraction later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<sqlx::Error> for SourceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Connection(err.to_string()),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. } => Self::DataIntegrity(err.to_string()),
            _ => Self::Query(err.to_string()),
        }
    }
}
