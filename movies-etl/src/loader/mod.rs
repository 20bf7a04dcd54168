//! Loader module for the movies ETL.
//!
//! Bulk-writes transformed batches into the search index and advances the resume
//! cursor once each batch is confirmed.
//!
//! # Checkpoints
//!
//! Several film works can share a modification time, and a batch boundary can fall
//! between them. After each intermediate batch the cursor is therefore stored one
//! microsecond below the batch watermark, so a restart re-reads the records tied with
//! the last loaded one. Only when the stream is exhausted, and every record at or below
//! the watermark has been loaded, is the exact watermark stored.

use chrono::{DateTime, Utc};
use futures::{Stream, TryStreamExt};
use movies_etl_repository::{SearchIndexError, SearchIndexProvider, StateStore};
use movies_etl_shared::{format_resume_token, previous_instant, IndexAction};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::errors::PipelineError;
use crate::retry::{retry_until_stopped, BackoffPolicy};
use crate::transformer::TransformedBatch;

/// Outcome of one pass over a batch stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Batches loaded and checkpointed.
    pub batches: usize,
    /// Documents written across all batches.
    pub documents: usize,
    /// Last cursor value stored, if any.
    pub checkpoint: Option<DateTime<Utc>>,
    /// Whether the stream was consumed to its end.
    pub completed: bool,
}

/// Loader that indexes documents into the search engine.
pub struct BulkLoader {
    provider: Arc<dyn SearchIndexProvider>,
    policy: BackoffPolicy,
}

impl BulkLoader {
    /// Create a new bulk loader with the given provider.
    pub fn new(provider: Arc<dyn SearchIndexProvider>, policy: BackoffPolicy) -> Self {
        Self { provider, policy }
    }

    /// Write `actions` in one bulk request.
    ///
    /// Transport failures are retried with backoff until `shutdown` turns true, which
    /// yields `PipelineError::Stopped`. The load is all-or-nothing: if the engine rejects
    /// any document the whole batch fails, so the cursor never moves past a record that
    /// is missing from the index.
    #[instrument(skip(self, actions, shutdown), fields(count = actions.len()))]
    pub async fn load(
        &self,
        actions: &[IndexAction],
        shutdown: &watch::Receiver<bool>,
    ) -> Result<usize, PipelineError> {
        if actions.is_empty() {
            return Ok(0);
        }

        let summary = retry_until_stopped(
            &self.policy,
            "bulk index",
            shutdown,
            || self.provider.bulk_index(actions),
            SearchIndexError::is_transient,
        )
        .await
        .ok_or(PipelineError::Stopped)??;

        if !summary.is_complete() {
            for failure in summary.failures() {
                error!(
                    document_id = %failure.document_id,
                    error = failure.error.as_deref().unwrap_or("unknown"),
                    "Document rejected by search index"
                );
            }
            return Err(SearchIndexError::bulk_index(format!(
                "{} of {} documents rejected",
                summary.failed, summary.total
            ))
            .into());
        }

        debug!(succeeded = summary.succeeded, "Batch loaded");
        Ok(summary.succeeded)
    }

    /// Load every batch of `batches` in order, checkpointing under `stream_name`.
    ///
    /// The shutdown flag is checked before each batch is pulled, and also ends a bulk
    /// request that is waiting on an unreachable index. A stop request ends the pass
    /// early with `completed = false`, leaving the last intermediate checkpoint in place. An error is returned as soon as a batch fails; batches already
    /// checkpointed stay loaded.
    #[instrument(skip_all, fields(stream = %stream_name))]
    pub async fn load_and_checkpoint<S>(
        &self,
        batches: S,
        state: &dyn StateStore,
        stream_name: &str,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<LoadReport, PipelineError>
    where
        S: Stream<Item = Result<TransformedBatch, PipelineError>>,
    {
        let mut batches = std::pin::pin!(batches);
        let mut report = LoadReport::default();
        let mut last_watermark = None;

        loop {
            let stop_requested = *shutdown.borrow();
            if stop_requested {
                info!(
                    batches = report.batches,
                    "Stop requested, leaving remaining batches for the next run"
                );
                return Ok(report);
            }

            let Some(batch) = batches.try_next().await? else {
                break;
            };

            let loaded = match self.load(&batch.actions, shutdown).await {
                Ok(loaded) => loaded,
                Err(PipelineError::Stopped) => {
                    info!(
                        batches = report.batches,
                        "Stop requested while the search index was unavailable"
                    );
                    return Ok(report);
                }
                Err(e) => return Err(e),
            };
            let checkpoint = previous_instant(batch.watermark);
            Self::checkpoint(state, stream_name, checkpoint).await?;

            report.batches += 1;
            report.documents += loaded;
            report.checkpoint = Some(checkpoint);
            last_watermark = Some(batch.watermark);

            info!(
                documents = loaded,
                watermark = %format_resume_token(batch.watermark),
                "Loaded batch"
            );
        }

        if let Some(watermark) = last_watermark {
            Self::checkpoint(state, stream_name, watermark).await?;
            report.checkpoint = Some(watermark);
        }

        report.completed = true;
        Ok(report)
    }

    async fn checkpoint(
        state: &dyn StateStore,
        stream_name: &str,
        value: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let token = format_resume_token(value);
        state.set_state(stream_name, &token).await?;
        debug!(token = %token, "Checkpoint saved");
        Ok(())
    }
}
