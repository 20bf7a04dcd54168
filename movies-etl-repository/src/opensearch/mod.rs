//! OpenSearch implementation of the search index provider.
//!
//! This module provides a concrete implementation of `SearchIndexProvider`
//! using OpenSearch as the backend. The same wire protocol is served by
//! Elasticsearch, so either engine can be the sink.

mod index_config;
mod provider;

pub use index_config::{index_definition_path, IndexDefinition};
pub use provider::OpenSearchProvider;
