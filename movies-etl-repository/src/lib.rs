//! # Movies ETL Repository
//!
//! This crate provides traits and implementations for the external systems of the
//! movies ETL pipeline. It includes definitions for errors, interfaces, and concrete
//! implementations for PostgreSQL (source), OpenSearch (sink) and a JSON file (state).

pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod postgres;
pub mod state;
pub mod types;

pub use errors::{SearchIndexError, SourceError, StateStoreError};
pub use interfaces::{MovieBatchStream, MoviesSource, SearchIndexProvider, StateStore};
pub use opensearch::{IndexDefinition, OpenSearchProvider};
pub use postgres::PostgresMoviesSource;
pub use state::JsonFileStateStore;
pub use types::{BatchOperationResult, BatchOperationSummary};
