//! Persistence seam for verified observations.

use async_trait::async_trait;
use chrono::NaiveDate;
use eggdb_core::{CatalogLocation, EggType, ObservationSource, PriceObservation};
use eggdb_db::{NewPriceObservation, NewStoreLocation, UpsertOutcome};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::error::RepositoryError;

/// What happened to one location's observations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    /// Rows inserted or updated.
    pub written: usize,
    /// Fallback estimates discarded because a live row already exists.
    pub skipped: usize,
    /// One message per observation that failed to write.
    pub errors: Vec<String>,
}

#[async_trait]
pub trait PriceRepository: Send + Sync {
    /// Checks the persistence layer is reachable before a run starts.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Writes every observation for `location` on `observed_on`.
    ///
    /// Only an unreachable persistence layer is an `Err`; individual write
    /// failures are reported in [`PersistReport::errors`].
    async fn persist_location(
        &self,
        location: &CatalogLocation,
        observed_on: NaiveDate,
        observations: &[PriceObservation],
        source: ObservationSource,
    ) -> Result<PersistReport, RepositoryError>;
}

/// Postgres-backed [`PriceRepository`].
#[derive(Debug, Clone)]
pub struct PgPriceRepository {
    pool: PgPool,
}

impl PgPriceRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a single live observation for `(chain, zip_code, observed_on,
    /// egg_type)`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Unavailable`] if no connection can be
    /// acquired, or [`RepositoryError::Persistence`] if the write fails.
    pub async fn upsert(
        &self,
        chain: &str,
        zip_code: &str,
        observed_on: NaiveDate,
        egg_type: EggType,
        price: Decimal,
        in_stock: bool,
    ) -> Result<UpsertOutcome, RepositoryError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(RepositoryError::Unavailable)?;
        let observation = NewPriceObservation {
            observed_on,
            egg_type,
            price,
            in_stock,
            source: ObservationSource::Live,
        };
        eggdb_db::upsert_observation(
            &mut conn,
            chain,
            &NewStoreLocation::zip_only(zip_code),
            &observation,
        )
        .await
        .map_err(|source| RepositoryError::Persistence { egg_type, source })
    }
}

#[async_trait]
impl PriceRepository for PgPriceRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        eggdb_db::ping(&self.pool)
            .await
            .map_err(RepositoryError::Unavailable)
    }

    async fn persist_location(
        &self,
        location: &CatalogLocation,
        observed_on: NaiveDate,
        observations: &[PriceObservation],
        source: ObservationSource,
    ) -> Result<PersistReport, RepositoryError> {
        // One pooled connection per location; released on drop.
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(RepositoryError::Unavailable)?;

        let store_location = NewStoreLocation {
            address: &location.address,
            zip_code: &location.zip_code,
            latitude: location.latitude,
            longitude: location.longitude,
        };

        let mut report = PersistReport::default();
        for observation in observations {
            let row = NewPriceObservation {
                observed_on,
                egg_type: observation.egg_type,
                price: observation.price,
                in_stock: observation.in_stock,
                source,
            };
            match eggdb_db::upsert_observation(&mut conn, &location.chain, &store_location, &row)
                .await
            {
                Ok(UpsertOutcome::Inserted | UpsertOutcome::Updated) => report.written += 1,
                Ok(UpsertOutcome::Skipped) => report.skipped += 1,
                Err(source) => {
                    let err = RepositoryError::Persistence {
                        egg_type: observation.egg_type,
                        source,
                    };
                    tracing::warn!(
                        chain = %location.chain,
                        zip = %location.zip_code,
                        error = %err,
                        "observation write failed"
                    );
                    report.errors.push(err.to_string());
                }
            }
        }

        Ok(report)
    }
}
