//! Find-or-create for `stores` and `store_locations`.
//!
//! Both are single `INSERT … ON CONFLICT … DO UPDATE … RETURNING id`
//! statements so concurrent callers converge on one row per key.

use sqlx::PgExecutor;

use crate::DbError;

/// Location attributes written the first time a (store, zip) pair is seen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewStoreLocation<'a> {
    pub address: &'a str,
    pub zip_code: &'a str,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl<'a> NewStoreLocation<'a> {
    /// A location known only by its zip code.
    #[must_use]
    pub fn zip_only(zip_code: &'a str) -> Self {
        Self {
            address: "",
            zip_code,
            latitude: None,
            longitude: None,
        }
    }
}

/// Returns the id of the store named `name`, creating it if needed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn find_or_create_store<'e, E>(executor: E, name: &str) -> Result<i64, DbError>
where
    E: PgExecutor<'e>,
{
    // The no-op update makes RETURNING yield the existing row on conflict.
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO stores (name) VALUES ($1) \
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
         RETURNING id",
    )
    .bind(name.trim())
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Returns the id of the `(store_id, zip_code)` location, creating it if
/// needed.
///
/// An existing row keeps its address and coordinates unless the new values
/// fill in something previously unknown.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn find_or_create_store_location<'e, E>(
    executor: E,
    store_id: i64,
    location: &NewStoreLocation<'_>,
) -> Result<i64, DbError>
where
    E: PgExecutor<'e>,
{
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO store_locations (store_id, address, zip_code, latitude, longitude) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (store_id, zip_code) DO UPDATE SET \
             address    = COALESCE(NULLIF(EXCLUDED.address, ''), store_locations.address), \
             latitude   = COALESCE(EXCLUDED.latitude, store_locations.latitude), \
             longitude  = COALESCE(EXCLUDED.longitude, store_locations.longitude), \
             updated_at = NOW() \
         RETURNING id",
    )
    .bind(store_id)
    .bind(location.address)
    .bind(location.zip_code)
    .bind(location.latitude)
    .bind(location.longitude)
    .fetch_one(executor)
    .await?;

    Ok(id)
}
