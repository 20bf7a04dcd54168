//! # Movies ETL Shared
//!
//! This crate defines shared data structures and types used across the movies ETL
//! pipeline. It includes the change record extracted from the relational store, the
//! document shape indexed into the search engine, and the resume token format
//! persisted between runs.

pub mod types;

pub use types::index_action::IndexAction;
pub use types::movie::{MovieDocument, MovieRecord, Person};
pub use types::resume_token::{format_resume_token, parse_resume_token, previous_instant};
