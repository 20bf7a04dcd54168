//! Streaming PostgreSQL source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{stream, Stream, StreamExt, TryStreamExt};
use movies_etl_shared::MovieRecord;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::pin::Pin;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::errors::SourceError;
use crate::interfaces::{MovieBatchStream, MoviesSource};
use crate::postgres::query::CHANGED_MOVIES_QUERY;
use crate::postgres::row::MovieRow;

type BatchSender = mpsc::Sender<Result<Vec<MovieRecord>, SourceError>>;
type BatchReceiver = mpsc::Receiver<Result<Vec<MovieRecord>, SourceError>>;

/// PostgreSQL-backed movies source.
///
/// Each extraction opens its own connection, issues `CHANGED_MOVIES_QUERY` once and
/// hands the row cursor to a producer task. The producer reads the next `chunk_size`
/// rows only when the consumer asks for another batch, so a single batch is held in
/// memory at a time however large the backlog is.
pub struct PostgresMoviesSource {
    options: PgConnectOptions,
}

impl PostgresMoviesSource {
    /// Creates a new PostgreSQL movies source.
    ///
    /// # Arguments
    ///
    /// * `options` - Connection options; no connection is made until `extract`
    pub fn new(options: PgConnectOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl MoviesSource for PostgresMoviesSource {
    #[instrument(skip(self))]
    async fn extract(
        &self,
        since: Option<DateTime<Utc>>,
        chunk_size: usize,
    ) -> Result<MovieBatchStream, SourceError> {
        if chunk_size == 0 {
            return Err(SourceError::Query("chunk size must be positive".to_string()));
        }

        let conn = PgConnection::connect_with(&self.options)
            .await
            .map_err(SourceError::from)?;

        info!(since = ?since, chunk_size = chunk_size, "Extracting changed movies");

        let (request_tx, request_rx) = mpsc::channel(1);
        let (batch_tx, batch_rx) = mpsc::channel(1);
        tokio::spawn(produce_batches(conn, since, chunk_size, request_rx, batch_tx));

        Ok(request_batches(request_tx, batch_rx))
    }
}

/// Stream that asks the producer for one batch per poll.
///
/// Ends when the producer has nothing left to send.
fn request_batches(requests: mpsc::Sender<()>, batches: BatchReceiver) -> MovieBatchStream {
    stream::unfold((requests, batches), |(requests, mut batches)| async move {
        requests.send(()).await.ok()?;
        let batch = batches.recv().await?;
        Some((batch, (requests, batches)))
    })
    .boxed()
}

/// Run the query and serve its batches, then close the connection.
async fn produce_batches(
    mut conn: PgConnection,
    since: Option<DateTime<Utc>>,
    chunk_size: usize,
    requests: mpsc::Receiver<()>,
    batches: BatchSender,
) {
    let rows = sqlx::query_as::<_, MovieRow>(CHANGED_MOVIES_QUERY)
        .bind(since)
        .fetch(&mut conn);
    let total = forward_batches(rows, chunk_size, requests, batches).await;
    debug!(total = total, "Extraction finished");

    if let Err(e) = conn.close().await {
        debug!(error = %e, "Failed to close source connection cleanly");
    }
}

/// Answer each request with the next `chunk_size` rows of `rows`.
///
/// Stops at the end of `rows`, after the first error, or once the consumer goes away.
/// Returns the number of records forwarded.
async fn forward_batches<S>(
    rows: S,
    chunk_size: usize,
    mut requests: mpsc::Receiver<()>,
    batches: BatchSender,
) -> usize
where
    S: Stream<Item = Result<MovieRow, sqlx::Error>>,
{
    let mut rows = std::pin::pin!(rows);
    let mut total = 0usize;

    while requests.recv().await.is_some() {
        match next_batch(&mut rows, chunk_size).await {
            Ok(batch) if batch.is_empty() => return total,
            Ok(batch) => {
                let size = batch.len();
                if batches.send(Ok(batch)).await.is_err() {
                    break;
                }
                total += size;
            }
            Err(e) => {
                error!(error = %e, forwarded = total, "Extraction aborted");
                let _ = batches.send(Err(e)).await;
                return total;
            }
        }
    }

    debug!("Batch consumer dropped, stopping extraction");
    total
}

async fn next_batch<S>(
    rows: &mut Pin<&mut S>,
    chunk_size: usize,
) -> Result<Vec<MovieRecord>, SourceError>
where
    S: Stream<Item = Result<MovieRow, sqlx::Error>>,
{
    let mut batch = Vec::with_capacity(chunk_size);
    while batch.len() < chunk_size {
        match rows.try_next().await? {
            Some(row) => batch.push(MovieRecord::try_from(row)?),
            None => break,
        }
    }
    Ok(batch)
}
