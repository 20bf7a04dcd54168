//! Error types for the movies ETL pipeline.

use movies_etl_repository::{SearchIndexError, SourceError, StateStoreError};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in one run of the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Error from the relational source.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Error from the search index.
    #[error("Search index error: {0}")]
    SearchIndex(#[from] SearchIndexError),

    /// Error from the persistent state store.
    #[error("State store error: {0}")]
    State(#[from] StateStoreError),

    /// The persisted resume token is not a timestamp.
    #[error("Invalid resume token {token:?}: {reason}")]
    InvalidToken { token: String, reason: String },

    /// A batch without records reached the transformer.
    #[error("Empty batch cannot carry a watermark")]
    EmptyBatch,

    /// A batch was not in ascending modification order.
    #[error("Batch is not ordered by modification time at record {0}")]
    UnorderedBatch(Uuid),

    /// A stop was requested while waiting on an unavailable backend.
    #[error("Stopped before the operation could complete")]
    Stopped,
}

impl PipelineError {
    /// Create an invalid token error.
    pub fn invalid_token(token: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidToken {
            token: token.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the orchestrator should retry the run after this error.
    ///
    /// Every failure except the state store is retried: progress that cannot be
    /// recorded must stop the process. A stop request is never retried.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, Self::State(_) | Self::Stopped)
    }
}
