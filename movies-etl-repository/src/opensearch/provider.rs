//! OpenSearch provider implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use movies_etl_shared::IndexAction;
use opensearch::{
    http::request::JsonBody,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::IndicesCreateParts,
    BulkParts, OpenSearch,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::opensearch::index_config::IndexDefinition;
use crate::types::{BatchOperationResult, BatchOperationSummary};

/// Error type reported by the engine when creating an index that exists.
const ALREADY_EXISTS_ERROR: &str = "resource_already_exists_exception";

/// HTTP statuses that mean the engine is temporarily unable to serve the request.
const TRANSIENT_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// OpenSearch provider implementation.
///
/// The provider only keeps the server URL. Every call builds a fresh client, so a
/// connection that went stale during the idle period between runs is never reused.
///
/// # Example
///
/// ```ignore
/// use movies_etl_repository::OpenSearchProvider;
///
/// let provider = OpenSearchProvider::new("http://localhost:9200")?;
/// let summary = provider.bulk_index(&actions).await?;
/// ```
pub struct OpenSearchProvider {
    url: Url,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch provider for the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new provider instance
    /// * `Err(SearchIndexError)` - If the URL is invalid
    pub fn new(url: &str) -> Result<Self, SearchIndexError> {
        let url = Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        info!(url = %url, "Created OpenSearch provider");

        Ok(Self { url })
    }

    /// Build a client with its own connection pool.
    fn connect(&self) -> Result<OpenSearch, SearchIndexError> {
        let conn_pool = SingleNodeConnectionPool::new(self.url.clone());
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        Ok(OpenSearch::new(transport))
    }

    /// Build the newline-delimited bulk body: one metadata line and one source line per action.
    fn build_bulk_body(actions: &[IndexAction]) -> Result<Vec<Value>, SearchIndexError> {
        let mut body = Vec::with_capacity(actions.len() * 2);
        for action in actions {
            let source = serde_json::to_value(&action.document).map_err(|e| {
                SearchIndexError::serialization(format!(
                    "Document {} is not serializable: {}",
                    action.id, e
                ))
            })?;
            body.push(json!({
                "index": {
                    "_index": action.index,
                    "_id": action.document_id(),
                }
            }));
            body.push(source);
        }
        Ok(body)
    }

    /// Turn a bulk response body into per-document results.
    fn parse_bulk_response(
        response: &Value,
        expected: usize,
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        let items = response
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| SearchIndexError::parse("Bulk response has no items array"))?;

        if items.len() != expected {
            return Err(SearchIndexError::parse(format!(
                "Bulk response has {} items, expected {}",
                items.len(),
                expected
            )));
        }

        let results = items
            .iter()
            .map(|item| {
                // Each item is keyed by its operation type ("index" for our requests)
                let outcome = item
                    .as_object()
                    .and_then(|ops| ops.values().next())
                    .cloned()
                    .unwrap_or(Value::Null);
                let document_id = outcome
                    .get("_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let status = outcome.get("status").and_then(Value::as_u64).unwrap_or(0);
                let error = outcome.get("error").filter(|e| !e.is_null());
                let success = error.is_none() && (200..300).contains(&status);

                BatchOperationResult {
                    document_id,
                    success,
                    error: if success {
                        None
                    } else {
                        Some(
                            error
                                .map(Value::to_string)
                                .unwrap_or_else(|| format!("status {}", status)),
                        )
                    },
                }
            })
            .collect();

        Ok(BatchOperationSummary::from_results(results))
    }

    /// Whether an index creation response means the index is already there.
    fn is_already_exists(status: u16, body: &Value) -> bool {
        status == 400
            && body
                .pointer("/error/type")
                .and_then(Value::as_str)
                .map(|t| t == ALREADY_EXISTS_ERROR)
                .unwrap_or(false)
    }

    fn is_transient_status(status: u16) -> bool {
        TRANSIENT_STATUSES.contains(&status)
    }
}

#[async_trait]
impl SearchIndexProvider for OpenSearchProvider {
    /// Create the index from its definition unless it already exists.
    ///
    /// An "already exists" rejection is treated as success, so this is safe to call on
    /// every startup.
    #[instrument(skip(self, definition))]
    async fn ensure_index(
        &self,
        index: &str,
        definition: &IndexDefinition,
    ) -> Result<(), SearchIndexError> {
        let client = self.connect()?;

        let response = client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(definition.creation_body())
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if status.is_success() {
            info!(index = %index, "Created search index");
            return Ok(());
        }

        let status = status.as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        if Self::is_already_exists(status, &body) {
            debug!(index = %index, "Search index already exists");
            return Ok(());
        }

        if Self::is_transient_status(status) {
            return Err(SearchIndexError::connection(format!(
                "Index creation unavailable with status {}",
                status
            )));
        }

        error!(status = status, body = %body, "Index creation failed");
        Err(SearchIndexError::index_creation(format!(
            "Index creation failed with status {}: {}",
            status, body
        )))
    }

    /// Index multiple documents in one bulk request.
    ///
    /// The request is sent as a single round trip. Item-level rejections are reported in
    /// the returned summary; transport failures and unavailable responses are returned as
    /// `ConnectionError` so the caller can retry the whole request.
    #[instrument(skip(self, actions), fields(count = actions.len()))]
    async fn bulk_index(
        &self,
        actions: &[IndexAction],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        if actions.is_empty() {
            return Ok(BatchOperationSummary::from_results(Vec::new()));
        }

        let body: Vec<JsonBody<Value>> = Self::build_bulk_body(actions)?
            .into_iter()
            .map(JsonBody::new)
            .collect();

        let client = self.connect()?;
        // Every metadata line names its index, so the request goes to `/_bulk`
        let response = client
            .bulk(BulkParts::None)
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let status = status.as_u16();
            let error_body = response.text().await.unwrap_or_default();
            if Self::is_transient_status(status) {
                return Err(SearchIndexError::connection(format!(
                    "Bulk request unavailable with status {}: {}",
                    status, error_body
                )));
            }
            error!(status = status, body = %error_body, "Bulk request failed");
            return Err(SearchIndexError::bulk_index(format!(
                "Bulk request failed with status {}: {}",
                status, error_body
            )));
        }

        let response_body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        let summary = Self::parse_bulk_response(&response_body, actions.len())?;
        debug!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Bulk request completed"
        );
        Ok(summary)
    }
}
