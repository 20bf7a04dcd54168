//! Interface definitions for the pipeline's external systems.
//!
//! This module defines the abstract traits that allow for dependency injection and
//! swappable implementations of the relational source, the search index and the
//! cursor state store.

mod movies_source;
mod search_index_provider;
mod state_store;

pub use movies_source::{MovieBatchStream, MoviesSource};
pub use search_index_provider::SearchIndexProvider;
pub use state_store::StateStore;
