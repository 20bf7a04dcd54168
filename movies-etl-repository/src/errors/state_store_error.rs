use std::path::PathBuf;
use thiserror::Error;

/// Represents errors that can occur within the state store.
///
/// None of these are retried: a state file that cannot be read or written means
/// progress can no longer be recorded safely.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("State file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt state file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("State serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
