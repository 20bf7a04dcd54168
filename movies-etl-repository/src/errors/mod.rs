//! Error types for the movies ETL repository.
//!
//! This module provides one error type per external system: the search index, the
//! relational source and the persistent state store.

mod search_index_error;
mod source_error;
mod state_store_error;

pub use search_index_error::SearchIndexError;
pub use source_error::SourceError;
pub use state_store_error::StateStoreError;
