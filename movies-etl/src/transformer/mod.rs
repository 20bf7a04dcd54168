//! Transformer module for the movies ETL.
//!
//! Converts extracted record batches into index actions and records each batch's
//! watermark, the modification time of its last record.

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use movies_etl_shared::{IndexAction, MovieRecord};

use crate::errors::PipelineError;

/// Index actions for one batch plus the timestamp the cursor may advance to.
#[derive(Debug, Clone)]
pub struct TransformedBatch {
    pub actions: Vec<IndexAction>,
    pub watermark: DateTime<Utc>,
}

impl TransformedBatch {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Transform one batch of records destined for `index`.
///
/// Fails on an empty batch, which has no watermark, and on a batch whose records are not
/// in ascending modification order, since its last record would not be its latest.
pub fn transform_batch(
    index: &str,
    records: Vec<MovieRecord>,
) -> Result<TransformedBatch, PipelineError> {
    let watermark = records
        .last()
        .map(|record| record.modified)
        .ok_or(PipelineError::EmptyBatch)?;

    if let Some(pair) = records.windows(2).find(|w| w[1].modified < w[0].modified) {
        return Err(PipelineError::UnorderedBatch(pair[1].id));
    }

    let actions = records
        .into_iter()
        .map(|record| {
            let (document, _) = record.into_document();
            IndexAction::new(index, document)
        })
        .collect();

    Ok(TransformedBatch { actions, watermark })
}

/// Lazily transform every batch of `batches`; errors pass through unchanged.
pub fn transform<S>(
    index: String,
    batches: S,
) -> impl Stream<Item = Result<TransformedBatch, PipelineError>>
where
    S: Stream<Item = Result<Vec<MovieRecord>, PipelineError>>,
{
    batches.map(move |batch| batch.and_then(|records| transform_batch(&index, records)))
}
