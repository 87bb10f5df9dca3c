//! Scrape pipeline orchestration: location selection, per-location
//! failure isolation, persistence, and run auditing.

mod error;
pub mod orchestrator;
pub mod repository;
pub mod runs;
pub mod selection;

use std::sync::Arc;

use eggdb_core::{AppConfig, Catalog};
use eggdb_scraper::{FetchClient, ScraperError};
use sqlx::PgPool;

pub use error::{RepositoryError, RunError};
pub use orchestrator::{
    collapse_by_egg_type, LocationStage, OrchestratorSettings, RunSummary, ScrapeOrchestrator,
    ScrapeResult, NO_LIVE_SCRAPER_REASON,
};
pub use repository::{PersistReport, PgPriceRepository, PriceRepository};
pub use runs::{run_and_record, RecordedRun, TriggerSource};
pub use selection::{select_locations, ScrapeScope};

/// Production wiring: [`FetchClient`] from config plus the Postgres repository.
///
/// # Errors
///
/// Returns [`ScraperError::Http`] if the HTTP client cannot be built.
pub fn build_orchestrator(
    config: &AppConfig,
    catalog: Catalog,
    pool: PgPool,
    dry_run: bool,
) -> Result<ScrapeOrchestrator, ScraperError> {
    let fetcher = FetchClient::from_config(config)?;
    let settings = OrchestratorSettings {
        dry_run,
        ..OrchestratorSettings::from_config(config)
    };
    Ok(ScrapeOrchestrator::new(
        catalog,
        Arc::new(fetcher),
        Arc::new(PgPriceRepository::new(pool)),
        settings,
    ))
}
