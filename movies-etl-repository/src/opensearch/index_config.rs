//! Index definitions loaded from JSON files.
//!
//! Settings and mappings for each index live next to the binary as
//! `<definitions_dir>/<index_name>.json` and are applied once at startup.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use crate::errors::SearchIndexError;

/// Settings and mappings of a search index.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings: Option<Value>,
}

impl IndexDefinition {
    /// Load the definition of `index_name` from `definitions_dir`.
    ///
    /// # Returns
    ///
    /// * `Ok(IndexDefinition)` - The parsed definition
    /// * `Err(SearchIndexError)` - If the file is missing or is not a valid definition
    pub fn load(definitions_dir: &Path, index_name: &str) -> Result<Self, SearchIndexError> {
        let path = index_definition_path(definitions_dir, index_name);
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            SearchIndexError::index_definition(format!(
                "Couldn't read index definition {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json(&contents).map_err(|e| {
            SearchIndexError::index_definition(format!(
                "Invalid index definition in {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Parse a definition from its JSON text.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    /// Request body for the index creation endpoint.
    pub fn creation_body(&self) -> Value {
        let mut body = json!({});
        if let Some(settings) = &self.settings {
            body["settings"] = settings.clone();
        }
        if let Some(mappings) = &self.mappings {
            body["mappings"] = mappings.clone();
        }
        body
    }
}

/// Path of the definition file for `index_name`.
pub fn index_definition_path(definitions_dir: &Path, index_name: &str) -> PathBuf {
    definitions_dir.join(format!("{}.json", index_name))
}
