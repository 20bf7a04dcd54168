//! Movie record and document types.
//!
//! `MovieRecord` is one denormalized row of the change query. `MovieDocument` is the
//! body stored in the search index, which is the record without its change-tracking
//! timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A person participating in a film work, as stored in nested document fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Person {
    pub id: Uuid,
    pub name: String,
}

impl Person {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A film work with all related genres and persons aggregated into it.
///
/// # Fields
///
/// - `id`: Unique identifier of the film work
/// - `imdb_rating`: Optional rating
/// - `genre`: Genre names
/// - `title`: Film title
/// - `description`: Description text, empty when missing in the source
/// - `director`, `actors_names`, `writers_names`: Person names grouped by role
/// - `actors`, `writers`: Nested id/name pairs grouped by role
/// - `modified`: Greatest modification time across the film and its related rows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieRecord {
    pub id: Uuid,
    pub imdb_rating: Option<f64>,
    pub genre: Vec<String>,
    pub title: String,
    pub description: String,
    pub director: Vec<String>,
    pub actors_names: Vec<String>,
    pub writers_names: Vec<String>,
    pub actors: Vec<Person>,
    pub writers: Vec<Person>,
    pub modified: DateTime<Utc>,
}

impl MovieRecord {
    /// Create a record with empty aggregates.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::Utc;
    /// use movies_etl_shared::MovieRecord;
    /// use uuid::Uuid;
    ///
    /// let record = MovieRecord::new(Uuid::new_v4(), "Star Wars", Utc::now());
    /// assert!(record.genre.is_empty());
    /// ```
    pub fn new(id: Uuid, title: impl Into<String>, modified: DateTime<Utc>) -> Self {
        Self {
            id,
            imdb_rating: None,
            genre: Vec::new(),
            title: title.into(),
            description: String::new(),
            director: Vec::new(),
            actors_names: Vec::new(),
            writers_names: Vec::new(),
            actors: Vec::new(),
            writers: Vec::new(),
            modified,
        }
    }

    /// Split the record into its search document and its modification time.
    pub fn into_document(self) -> (MovieDocument, DateTime<Utc>) {
        let modified = self.modified;
        let document = MovieDocument {
            id: self.id,
            imdb_rating: self.imdb_rating,
            genre: self.genre,
            title: self.title,
            description: self.description,
            director: self.director,
            actors_names: self.actors_names,
            writers_names: self.writers_names,
            actors: self.actors,
            writers: self.writers,
        };
        (document, modified)
    }
}

/// Document representation for the search index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieDocument {
    pub id: Uuid,
    pub imdb_rating: Option<f64>,
    pub genre: Vec<String>,
    pub title: String,
    pub description: String,
    pub director: Vec<String>,
    pub actors_names: Vec<String>,
    pub writers_names: Vec<String>,
    pub actors: Vec<Person>,
    pub writers: Vec<Person>,
}
