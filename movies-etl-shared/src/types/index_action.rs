//! Index action passed from the transformer to the bulk loader.

use uuid::Uuid;

use crate::types::movie::MovieDocument;

/// A single document write against the search index.
///
/// The document id always equals the source record id, so writing the same action
/// twice overwrites the document instead of duplicating it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexAction {
    /// Name of the target index.
    pub index: String,
    /// Document id in the target index.
    pub id: Uuid,
    /// Document body.
    pub document: MovieDocument,
}

impl IndexAction {
    pub fn new(index: impl Into<String>, document: MovieDocument) -> Self {
        Self {
            index: index.into(),
            id: document.id,
            document,
        }
    }

    /// Document id as used in the bulk request metadata line.
    pub fn document_id(&self) -> String {
        self.id.to_string()
    }
}
