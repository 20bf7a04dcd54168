//! # Movies ETL
//!
//! Incrementally synchronizes the movies dataset from PostgreSQL into the search
//! index, resuming from a persisted cursor after restarts.
//!
//! ## Architecture
//!
//! The pipeline follows the Extractor-Transformer-Loader pattern:
//!
//! 1. **Extractor**: Streams film works modified after the cursor, in bounded batches
//! 2. **Transformer**: Turns each batch into index actions plus its watermark
//! 3. **Loader**: Bulk-writes each batch and advances the cursor after it is confirmed
//! 4. **Orchestrator**: Repeats the pipeline on an interval and retries failed runs
//!
//! ## Modules
//!
//! - [`config`]: Configuration and dependency initialization
//! - [`extractor`]: Change extraction from the source
//! - [`transformer`]: Record to document transformation
//! - [`loader`]: Bulk loading and checkpointing
//! - [`orchestrator`]: The periodic ETL loop
//! - [`retry`]: Backoff policy shared by all retrying call sites
//! - [`errors`]: Error types for the pipeline

pub mod config;
pub mod errors;
pub mod extractor;
pub mod loader;
pub mod orchestrator;
pub mod retry;
pub mod transformer;

pub use config::{AppConfig, Dependencies};
pub use errors::PipelineError;

use thiserror::Error;

/// Errors that can occur during ETL initialization or execution.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] PipelineError),
}

impl EtlError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
