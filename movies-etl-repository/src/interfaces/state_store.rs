use async_trait::async_trait;

use crate::errors::StateStoreError;

/// Trait for interacting with the persistent cursor state.
///
/// This trait provides a clean abstraction over the durable key-value storage that
/// records pipeline progress. It handles the retrieval and persistence of resume tokens.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_state(&self, key: &str) -> Result<Option<String>, StateStoreError>;
    async fn set_state(&self, key: &str, value: &str) -> Result<(), StateStoreError>;
}
