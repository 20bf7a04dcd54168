//! PostgreSQL implementation of the movies source.
//!
//! This module provides the change query, the row mapping into `MovieRecord` and
//! the streaming `PostgresMoviesSource`.

mod query;
mod row;
mod source;

pub use query::CHANGED_MOVIES_QUERY;
pub use source::PostgresMoviesSource;
