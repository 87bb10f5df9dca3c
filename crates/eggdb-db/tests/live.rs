//! Live integration tests for eggdb-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/eggdb-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use std::str::FromStr;

use chrono::NaiveDate;
use eggdb_core::{EggType, ObservationSource};
use eggdb_db::{
    complete_scrape_run, create_scrape_run, fail_scrape_run, find_or_create_store,
    find_or_create_store_location, get_scrape_run, list_observations_on, list_scrape_runs,
    start_scrape_run, upsert_observation, upsert_price_observation, DbError, NewPriceObservation,
    NewStoreLocation, UpsertOutcome,
};
use rust_decimal::Decimal;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).expect("valid date")
}

fn observation(egg_type: EggType, price: &str, source: ObservationSource) -> NewPriceObservation {
    NewPriceObservation {
        observed_on: day(),
        egg_type,
        price: Decimal::from_str(price).expect("valid decimal"),
        in_stock: true,
        source,
    }
}

async fn count_rows(pool: &sqlx::PgPool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap_or_else(|e| panic!("count {table} failed: {e}"))
}

// ---------------------------------------------------------------------------
// Stores and locations
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn find_or_create_store_is_stable(pool: sqlx::PgPool) {
    let first = find_or_create_store(&pool, "Acme").await.unwrap();
    let second = find_or_create_store(&pool, " Acme ").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(count_rows(&pool, "stores").await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn store_location_keeps_known_address(pool: sqlx::PgPool) {
    let store_id = find_or_create_store(&pool, "Acme").await.unwrap();
    let full = NewStoreLocation {
        address: "1200 Sunset Blvd, Los Angeles, CA 90026",
        zip_code: "90026",
        latitude: Some(34.0777),
        longitude: Some(-118.2606),
    };
    let first = find_or_create_store_location(&pool, store_id, &full)
        .await
        .unwrap();
    let second = find_or_create_store_location(&pool, store_id, &NewStoreLocation::zip_only("90026"))
        .await
        .unwrap();
    assert_eq!(first, second);

    let (address, latitude): (String, Option<f64>) =
        sqlx::query_as("SELECT address, latitude FROM store_locations WHERE id = $1")
            .bind(first)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(address, "1200 Sunset Blvd, Los Angeles, CA 90026");
    assert_eq!(latitude, Some(34.0777));
}

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn repeated_upsert_leaves_one_row(pool: sqlx::PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let location = NewStoreLocation::zip_only("90026");
    let obs = observation(EggType::Regular, "3.99", ObservationSource::Live);

    let first = upsert_observation(&mut conn, "Acme", &location, &obs)
        .await
        .unwrap();
    let second = upsert_observation(&mut conn, "Acme", &location, &obs)
        .await
        .unwrap();
    assert_eq!(first, UpsertOutcome::Inserted);
    assert_eq!(second, UpsertOutcome::Updated);

    let rows = list_observations_on(&pool, "Acme", "90026", day())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].price, Decimal::from_str("3.99").unwrap());
    assert_eq!(rows[0].egg_type, "regular");
    assert_eq!(rows[0].source, "live");
    assert_eq!(count_rows(&pool, "stores").await, 1);
    assert_eq!(count_rows(&pool, "store_locations").await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn same_day_rescrape_updates_price_in_place(pool: sqlx::PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let location = NewStoreLocation::zip_only("90026");

    upsert_observation(
        &mut conn,
        "Acme",
        &location,
        &observation(EggType::Organic, "6.10", ObservationSource::Live),
    )
    .await
    .unwrap();
    let mut cheaper = observation(EggType::Organic, "5.75", ObservationSource::Live);
    cheaper.in_stock = false;
    upsert_observation(&mut conn, "Acme", &location, &cheaper)
        .await
        .unwrap();

    let rows = list_observations_on(&pool, "Acme", "90026", day())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].price, Decimal::from_str("5.75").unwrap());
    assert!(!rows[0].in_stock);
}

#[sqlx::test(migrations = "../../migrations")]
async fn regular_and_organic_are_separate_rows(pool: sqlx::PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let location = NewStoreLocation::zip_only("90026");
    for obs in [
        observation(EggType::Regular, "4.25", ObservationSource::Live),
        observation(EggType::Organic, "6.10", ObservationSource::Live),
    ] {
        upsert_observation(&mut conn, "Acme", &location, &obs)
            .await
            .unwrap();
    }

    let rows = list_observations_on(&pool, "Acme", "90026", day())
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].egg_type, "regular");
    assert_eq!(rows[1].egg_type, "organic");
}

#[sqlx::test(migrations = "../../migrations")]
async fn fallback_estimate_never_overwrites_live(pool: sqlx::PgPool) {
    let store_id = find_or_create_store(&pool, "Acme").await.unwrap();
    let location_id =
        find_or_create_store_location(&pool, store_id, &NewStoreLocation::zip_only("90026"))
            .await
            .unwrap();

    let live = observation(EggType::Regular, "4.25", ObservationSource::Live);
    let estimate = observation(EggType::Regular, "3.49", ObservationSource::FallbackEstimate);

    assert_eq!(
        upsert_price_observation(&pool, location_id, &live)
            .await
            .unwrap(),
        UpsertOutcome::Inserted
    );
    assert_eq!(
        upsert_price_observation(&pool, location_id, &estimate)
            .await
            .unwrap(),
        UpsertOutcome::Skipped
    );

    let rows = list_observations_on(&pool, "Acme", "90026", day())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].price, Decimal::from_str("4.25").unwrap());
    assert_eq!(rows[0].source, "live");
}

#[sqlx::test(migrations = "../../migrations")]
async fn live_overwrites_fallback_estimate(pool: sqlx::PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let location = NewStoreLocation::zip_only("62701");

    upsert_observation(
        &mut conn,
        "Corner Grocer",
        &location,
        &observation(EggType::Regular, "3.49", ObservationSource::FallbackEstimate),
    )
    .await
    .unwrap();
    let outcome = upsert_observation(
        &mut conn,
        "Corner Grocer",
        &location,
        &observation(EggType::Regular, "3.89", ObservationSource::Live),
    )
    .await
    .unwrap();
    assert_eq!(outcome, UpsertOutcome::Updated);

    let rows = list_observations_on(&pool, "Corner Grocer", "62701", day())
        .await
        .unwrap();
    assert_eq!(rows[0].source, "live");
    assert_eq!(rows[0].price, Decimal::from_str("3.89").unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn non_positive_price_is_rejected_by_constraint(pool: sqlx::PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let result = upsert_observation(
        &mut conn,
        "Acme",
        &NewStoreLocation::zip_only("90026"),
        &observation(EggType::Regular, "0.00", ObservationSource::Live),
    )
    .await;
    assert!(matches!(result, Err(DbError::Sqlx(_))), "got: {result:?}");
    assert_eq!(count_rows(&pool, "price_observations").await, 0);
}

// ---------------------------------------------------------------------------
// Scrape runs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn scrape_run_lifecycle(pool: sqlx::PgPool) {
    let run = create_scrape_run(&pool, "sample", "cli").await.unwrap();
    assert_eq!(run.status, "queued");

    start_scrape_run(&pool, run.id).await.unwrap();
    complete_scrape_run(&pool, run.id, 50, 47).await.unwrap();

    let stored = get_scrape_run(&pool, run.id).await.unwrap();
    assert_eq!(stored.status, "succeeded");
    assert_eq!(stored.attempted, 50);
    assert_eq!(stored.succeeded, 47);
    assert!(stored.started_at.is_some());
    assert!(stored.completed_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn completing_a_queued_run_is_rejected(pool: sqlx::PgPool) {
    let run = create_scrape_run(&pool, "full", "scheduler").await.unwrap();
    let err = complete_scrape_run(&pool, run.id, 1, 1).await.unwrap_err();
    assert!(matches!(
        err,
        DbError::InvalidScrapeRunTransition {
            expected_status: "running",
            ..
        }
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn failed_run_records_message(pool: sqlx::PgPool) {
    let run = create_scrape_run(&pool, "sample", "api").await.unwrap();
    start_scrape_run(&pool, run.id).await.unwrap();
    fail_scrape_run(&pool, run.id, "persistence unavailable")
        .await
        .unwrap();

    let stored = get_scrape_run(&pool, run.id).await.unwrap();
    assert_eq!(stored.status, "failed");
    assert_eq!(stored.error_message.as_deref(), Some("persistence unavailable"));

    let err = fail_scrape_run(&pool, run.id, "again").await.unwrap_err();
    assert!(matches!(err, DbError::InvalidScrapeRunTransition { .. }));
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_scrape_runs_newest_first(pool: sqlx::PgPool) {
    let first = create_scrape_run(&pool, "sample", "cli").await.unwrap();
    let second = create_scrape_run(&pool, "full", "cli").await.unwrap();

    let runs = list_scrape_runs(&pool, 10).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, second.id);
    assert_eq!(runs[1].id, first.id);

    let limited = list_scrape_runs(&pool, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn get_missing_run_is_not_found(pool: sqlx::PgPool) {
    let err = get_scrape_run(&pool, 999_999).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound));
}

#[sqlx::test(migrations = "../../migrations")]
async fn unknown_scope_is_rejected(pool: sqlx::PgPool) {
    let result = create_scrape_run(&pool, "weekly", "cli").await;
    assert!(matches!(result, Err(DbError::Sqlx(_))));
}
