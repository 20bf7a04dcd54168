//! JSON file implementation of the state store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::errors::StateStoreError;
use crate::interfaces::StateStore;

type StateMap = BTreeMap<String, String>;

/// File-backed state store.
///
/// The whole mapping is loaded once on open and kept in memory. Each update writes the
/// full mapping to a temporary file in the same directory, syncs it and renames it over
/// the state file, so a crash leaves either the old or the new mapping on disk.
pub struct JsonFileStateStore {
    path: PathBuf,
    state: Mutex<StateMap>,
}

impl JsonFileStateStore {
    /// Open the state file at `path`, creating it with an empty mapping if absent.
    ///
    /// # Returns
    ///
    /// * `Ok(JsonFileStateStore)` - Store holding the persisted mapping
    /// * `Err(StateStoreError)` - If the file cannot be read or does not hold a JSON
    ///   object of strings
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateStoreError> {
        let path = path.into();

        let state = if path.is_file() {
            Self::retrieve_state(&path)?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let empty = StateMap::new();
            Self::save_state(&path, &empty)?;
            info!(path = %path.display(), "Initialized empty state file");
            empty
        };

        debug!(path = %path.display(), keys = state.len(), "Loaded state");

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn retrieve_state(path: &Path) -> Result<StateMap, StateStoreError> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            error!(path = %path.display(), error = %e, "Invalid saved state");
            StateStoreError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })
    }

    fn save_state(path: &Path, state: &StateMap) -> Result<(), StateStoreError> {
        let payload = serde_json::to_vec(state)?;

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(&payload)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| StateStoreError::Io(e.error))?;

        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn get_state(&self, key: &str) -> Result<Option<String>, StateStoreError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.get(key).cloned())
    }

    async fn set_state(&self, key: &str, value: &str) -> Result<(), StateStoreError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut updated = state.clone();
        updated.insert(key.to_string(), value.to_string());
        Self::save_state(&self.path, &updated)?;
        *state = updated;

        debug!(key = %key, value = %value, "Saved state");
        Ok(())
    }
}
