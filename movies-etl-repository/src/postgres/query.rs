//! Incremental change query over the movies schema.

/// Select every film work whose own row, or any related genre or person row, was
/// modified after `$1`, with all related rows aggregated into it.
///
/// `$1` is a nullable `timestamptz`; `NULL` selects the whole table. Filtering happens
/// in `HAVING` on the aggregated timestamp so a film whose person changed is emitted
/// with all of its persons, not only the changed one. Ordering by `modified` makes batch
/// boundaries valid checkpoints; `id` breaks ties deterministically.
pub const CHANGED_MOVIES_QUERY: &str = r#"
SELECT
    f.id,
    f.rating AS imdb_rating,
    ARRAY_AGG(DISTINCT g.name::TEXT) FILTER (WHERE g.name IS NOT NULL) AS genre,
    f.title,
    f.description,
    ARRAY_AGG(DISTINCT p.full_name::TEXT) FILTER (WHERE pfw.role = 'director') AS director,
    ARRAY_AGG(DISTINCT p.full_name::TEXT) FILTER (WHERE pfw.role = 'actor') AS actors_names,
    ARRAY_AGG(DISTINCT p.full_name::TEXT) FILTER (WHERE pfw.role = 'writer') AS writers_names,
    JSONB_AGG(DISTINCT JSONB_BUILD_OBJECT('id', p.id, 'name', p.full_name))
        FILTER (WHERE pfw.role = 'actor') AS actors,
    JSONB_AGG(DISTINCT JSONB_BUILD_OBJECT('id', p.id, 'name', p.full_name))
        FILTER (WHERE pfw.role = 'writer') AS writers,
    GREATEST(f.modified, MAX(p.modified), MAX(g.modified)) AS modified
FROM
    film_work AS f
    LEFT JOIN genre_film_work AS gfw ON f.id = gfw.film_work_id
    LEFT JOIN genre AS g ON gfw.genre_id = g.id
    LEFT JOIN person_film_work AS pfw ON f.id = pfw.film_work_id
    LEFT JOIN person AS p ON pfw.person_id = p.id
GROUP BY f.id
HAVING
    $1::timestamptz IS NULL
    OR GREATEST(f.modified, MAX(p.modified), MAX(g.modified)) > $1::timestamptz
ORDER BY modified ASC, f.id ASC
"#;
