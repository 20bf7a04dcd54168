//! Search index provider trait definition.
//!
//! This module defines the abstract interface for search index operations,
//! allowing for different backend implementations (OpenSearch, Elasticsearch, etc.).

use async_trait::async_trait;
use movies_etl_shared::IndexAction;

use crate::errors::SearchIndexError;
use crate::opensearch::IndexDefinition;
use crate::types::BatchOperationSummary;

/// Abstracts the underlying search index implementation (OpenSearch, Elasticsearch, etc.).
///
/// All methods return `Result<T, SearchIndexError>` for consistent error handling across
/// different backend implementations.
///
/// # Note on Document Writes
///
/// Every write is a full-document `index` operation keyed by the record id, so
/// submitting the same action twice leaves the index unchanged.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Create the index from its definition unless it already exists.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the index was created or already existed
    /// * `Err(SearchIndexError)` - If creation failed for any other reason
    async fn ensure_index(
        &self,
        index: &str,
        definition: &IndexDefinition,
    ) -> Result<(), SearchIndexError>;

    /// Index multiple documents in one bulk request.
    ///
    /// # Arguments
    ///
    /// * `actions` - Documents to write, each carrying its target index and id
    ///
    /// # Returns
    ///
    /// * `Ok(BatchOperationSummary)` - Per-document outcome of the bulk request
    /// * `Err(SearchIndexError)` - If the bulk request failed entirely
    async fn bulk_index(
        &self,
        actions: &[IndexAction],
    ) -> Result<BatchOperationSummary, SearchIndexError>;
}
