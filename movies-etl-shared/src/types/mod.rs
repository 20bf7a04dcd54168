//! This module defines the core data structures and types used across the movies ETL.
//! It re-exports specific types like `MovieRecord` and `IndexAction`.

pub mod index_action;
pub mod movie;
pub mod resume_token;

pub use index_action::IndexAction;
pub use movie::{MovieDocument, MovieRecord, Person};
