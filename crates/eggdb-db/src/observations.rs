//! Daily price observations keyed by `(store_location_id, observed_on, egg_type)`.

use chrono::{DateTime, NaiveDate, Utc};
use eggdb_core::{EggType, ObservationSource};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor};

use crate::stores::{find_or_create_store, find_or_create_store_location, NewStoreLocation};
use crate::DbError;

/// One price fact ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPriceObservation {
    pub observed_on: NaiveDate,
    pub egg_type: EggType,
    pub price: Decimal,
    pub in_stock: bool,
    pub source: ObservationSource,
}

/// What an upsert did to the row for its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// A fallback estimate met an existing live row and was discarded.
    Skipped,
}

/// A row from the `price_observations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceObservationRow {
    pub id: i64,
    pub store_location_id: i64,
    pub observed_on: NaiveDate,
    pub egg_type: String,
    pub price: Decimal,
    pub in_stock: bool,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert or update the observation for `(store_location_id, observed_on,
/// egg_type)`.
///
/// A `live` write always replaces the existing row; a `fallback_estimate`
/// write only replaces another estimate.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails (including the
/// positive-price check constraint).
pub async fn upsert_price_observation<'e, E>(
    executor: E,
    store_location_id: i64,
    observation: &NewPriceObservation,
) -> Result<UpsertOutcome, DbError>
where
    E: PgExecutor<'e>,
{
    let is_new = sqlx::query_scalar::<_, bool>(
        "INSERT INTO price_observations \
             (store_location_id, observed_on, egg_type, price, in_stock, source) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (store_location_id, observed_on, egg_type) DO UPDATE SET \
             price      = EXCLUDED.price, \
             in_stock   = EXCLUDED.in_stock, \
             source     = EXCLUDED.source, \
             updated_at = NOW() \
         WHERE price_observations.source = 'fallback_estimate' OR EXCLUDED.source = 'live' \
         RETURNING (xmax = 0) AS is_new",
    )
    .bind(store_location_id)
    .bind(observation.observed_on)
    .bind(observation.egg_type.as_str())
    .bind(observation.price)
    .bind(observation.in_stock)
    .bind(observation.source.as_str())
    .fetch_optional(executor)
    .await?;

    Ok(match is_new {
        Some(true) => UpsertOutcome::Inserted,
        Some(false) => UpsertOutcome::Updated,
        None => UpsertOutcome::Skipped,
    })
}

/// `upsert(chain, zip, date, egg_type, price, in_stock)`: find-or-create the
/// store and location, then upsert the observation, all on one connection.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any of the three statements fails.
pub async fn upsert_observation(
    conn: &mut PgConnection,
    chain: &str,
    location: &NewStoreLocation<'_>,
    observation: &NewPriceObservation,
) -> Result<UpsertOutcome, DbError> {
    let store_id = find_or_create_store(&mut *conn, chain).await?;
    let store_location_id = find_or_create_store_location(&mut *conn, store_id, location).await?;
    upsert_price_observation(&mut *conn, store_location_id, observation).await
}

/// Observations recorded for one store location on one day, regular first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_observations_on<'e, E>(
    executor: E,
    chain: &str,
    zip_code: &str,
    observed_on: NaiveDate,
) -> Result<Vec<PriceObservationRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, PriceObservationRow>(
        "SELECT po.id, po.store_location_id, po.observed_on, po.egg_type, po.price, \
                po.in_stock, po.source, po.created_at, po.updated_at \
         FROM price_observations po \
         JOIN store_locations sl ON sl.id = po.store_location_id \
         JOIN stores s ON s.id = sl.store_id \
         WHERE s.name = $1 AND sl.zip_code = $2 AND po.observed_on = $3 \
         ORDER BY po.egg_type DESC",
    )
    .bind(chain.trim())
    .bind(zip_code)
    .bind(observed_on)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}
