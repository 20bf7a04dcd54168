//! Movies source trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use movies_etl_shared::MovieRecord;

use crate::errors::SourceError;

/// Lazy, finite stream of record batches in ascending `modified` order.
pub type MovieBatchStream = BoxStream<'static, Result<Vec<MovieRecord>, SourceError>>;

/// Abstracts the relational store holding the movies dataset.
///
/// Implementations issue the change query exactly once per `extract` call and stream
/// the result in batches without materializing it.
#[async_trait]
pub trait MoviesSource: Send + Sync {
    /// Stream every record modified strictly after `since`.
    ///
    /// `since = None` means a full resync. Each yielded batch holds between 1 and
    /// `chunk_size` records, ordered ascending by `modified`. An `Err` item ends the
    /// stream.
    ///
    /// # Returns
    ///
    /// * `Ok(MovieBatchStream)` - Once the query has been issued
    /// * `Err(SourceError)` - If the source cannot be reached
    async fn extract(
        &self,
        since: Option<DateTime<Utc>>,
        chunk_size: usize,
    ) -> Result<MovieBatchStream, SourceError>;
}
