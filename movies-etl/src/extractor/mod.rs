//! Extractor module for the movies ETL.
//!
//! Turns the persisted resume token into a source query and opens the batch stream.

use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use movies_etl_repository::{MoviesSource, SourceError};
use movies_etl_shared::{parse_resume_token, MovieRecord};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument};

use crate::errors::PipelineError;
use crate::retry::{retry_until_stopped, BackoffPolicy};

/// Stream of record batches, in ascending modification order.
pub type RecordBatchStream = BoxStream<'static, Result<Vec<MovieRecord>, PipelineError>>;

/// Opens change streams against a movies source.
pub struct Extractor {
    source: Arc<dyn MoviesSource>,
    chunk_size: usize,
    policy: BackoffPolicy,
}

impl Extractor {
    /// Create a new extractor reading `chunk_size` records per batch.
    pub fn new(source: Arc<dyn MoviesSource>, chunk_size: usize, policy: BackoffPolicy) -> Self {
        Self {
            source,
            chunk_size,
            policy,
        }
    }

    /// Stream every record modified strictly after `token`, or everything when absent.
    ///
    /// Opening the stream is retried while the source is unreachable, until `shutdown`
    /// turns true, which yields `PipelineError::Stopped`. Errors raised while the stream
    /// is being consumed are yielded as items and end the run.
    #[instrument(skip(self, shutdown))]
    pub async fn extract(
        &self,
        token: Option<&str>,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<RecordBatchStream, PipelineError> {
        let since = token
            .map(|t| parse_resume_token(t).map_err(|e| PipelineError::invalid_token(t, e)))
            .transpose()?;

        info!(since = ?since, chunk_size = self.chunk_size, "Opening change stream");

        let batches = retry_until_stopped(
            &self.policy,
            "open change stream",
            shutdown,
            || self.source.extract(since, self.chunk_size),
            SourceError::is_transient,
        )
        .await
        .ok_or(PipelineError::Stopped)??;

        Ok(batches.map_err(PipelineError::from).boxed())
    }
}
