//! Row mapping for the change query.
//!
//! Every column is decoded as nullable and validated explicitly, so the null policy
//! lives in one place and a bad row fails closed instead of being coerced.

use chrono::{DateTime, Utc};
use movies_etl_shared::{MovieRecord, Person};
use sqlx::types::Json;
use uuid::Uuid;

use crate::errors::SourceError;

/// Raw row of `CHANGED_MOVIES_QUERY`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MovieRow {
    pub id: Option<Uuid>,
    pub imdb_rating: Option<f64>,
    pub genre: Option<Vec<String>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub director: Option<Vec<String>>,
    pub actors_names: Option<Vec<String>>,
    pub writers_names: Option<Vec<String>>,
    pub actors: Option<Json<Vec<Person>>>,
    pub writers: Option<Json<Vec<Person>>>,
    pub modified: Option<DateTime<Utc>>,
}

impl TryFrom<MovieRow> for MovieRecord {
    type Error = SourceError;

    /// Apply the null policy: lists default to empty, description to an empty string,
    /// rating stays optional, and a missing id, title or timestamp rejects the row.
    fn try_from(row: MovieRow) -> Result<Self, Self::Error> {
        let id = row
            .id
            .ok_or_else(|| SourceError::data_integrity("film work row without id"))?;
        let title = row.title.ok_or_else(|| {
            SourceError::data_integrity(format!("film work {} has no title", id))
        })?;
        let modified = row.modified.ok_or_else(|| {
            SourceError::data_integrity(format!("film work {} has no modification time", id))
        })?;

        Ok(MovieRecord {
            id,
            imdb_rating: row.imdb_rating,
            genre: row.genre.unwrap_or_default(),
            title,
            description: row.description.unwrap_or_default(),
            director: row.director.unwrap_or_default(),
            actors_names: row.actors_names.unwrap_or_default(),
            writers_names: row.writers_names.unwrap_or_default(),
            actors: row.actors.map(|Json(persons)| persons).unwrap_or_default(),
            writers: row.writers.map(|Json(persons)| persons).unwrap_or_default(),
            modified,
        })
    }
}
