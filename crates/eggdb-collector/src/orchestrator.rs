//! Drives format → fetch → extract → verify → persist over a catalog
//! subset, containing every per-location failure.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use eggdb_core::{
    AppConfig, Catalog, CatalogLocation, ChainProfile, EggType, ObservationSource,
    PriceObservation,
};
use eggdb_scraper::{
    FetchOptions, LocationVerifier, PageFetcher, ProductExtractor, UrlFormatter,
    UNVERIFIED_REASON,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;

use crate::error::{RepositoryError, RunError};
use crate::repository::PriceRepository;
use crate::selection::{select_locations, ScrapeScope};

/// Failure reason for chains that cannot be scraped and have no estimates.
pub const NO_LIVE_SCRAPER_REASON: &str = "no live scraper configured";

/// Per-location pipeline position.
///
/// `Pending → Formatted → Fetched → Extracted → (Verified → Persisted) |
/// Rejected → Done`. A [`ScrapeResult`] records the last stage reached
/// before `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStage {
    Pending,
    Formatted,
    Fetched,
    Extracted,
    Verified,
    Persisted,
    Rejected,
    Done,
}

/// Outcome for one catalog location in one run. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub chain: String,
    pub zip_code: String,
    pub url: String,
    pub observation_count: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stage: LocationStage,
    pub source: ObservationSource,
    /// Zip the page revealed, when it revealed one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_zip: Option<String>,
}

impl ScrapeResult {
    fn failed(location: &CatalogLocation, url: &str, stage: LocationStage, error: String) -> Self {
        Self {
            chain: location.chain.clone(),
            zip_code: location.zip_code.clone(),
            url: url.to_string(),
            observation_count: 0,
            success: false,
            error: Some(error),
            stage,
            source: ObservationSource::Live,
            actual_zip: None,
        }
    }
}

/// Aggregated outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub scope: ScrapeScope,
    pub observed_on: NaiveDate,
    pub attempted: usize,
    pub succeeded: usize,
    pub results: Vec<ScrapeResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub sample_size: usize,
    pub max_concurrent: usize,
    pub inter_request_delay: Duration,
    /// Run every stage except persistence.
    pub dry_run: bool,
}

impl OrchestratorSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            sample_size: config.sample_size,
            max_concurrent: config.scraper_max_concurrent_locations.max(1),
            inter_request_delay: Duration::from_millis(config.scraper_inter_request_delay_ms),
            dry_run: false,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            sample_size: 50,
            max_concurrent: 1,
            inter_request_delay: Duration::ZERO,
            dry_run: false,
        }
    }
}

pub struct ScrapeOrchestrator {
    catalog: Catalog,
    formatter: UrlFormatter,
    fetcher: Arc<dyn PageFetcher>,
    repository: Arc<dyn PriceRepository>,
    settings: OrchestratorSettings,
}

impl ScrapeOrchestrator {
    #[must_use]
    pub fn new(
        catalog: Catalog,
        fetcher: Arc<dyn PageFetcher>,
        repository: Arc<dyn PriceRepository>,
        settings: OrchestratorSettings,
    ) -> Self {
        let formatter = UrlFormatter::from_catalog(&catalog);
        Self {
            catalog,
            formatter,
            fetcher,
            repository,
            settings,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn formatter(&self) -> &UrlFormatter {
        &self.formatter
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.settings.dry_run
    }

    /// Scrapes the locations `scope` selects, optionally narrowed to one
    /// chain, and aggregates results in selection order.
    ///
    /// # Errors
    ///
    /// - [`RunError::UnknownChain`] if `chain_filter` matches no location.
    /// - [`RunError::PersistenceUnavailable`] if the repository cannot be
    ///   reached before or during the run.
    pub async fn run(
        &self,
        scope: ScrapeScope,
        chain_filter: Option<&str>,
    ) -> Result<RunSummary, RunError> {
        let catalog = match chain_filter {
            Some(chain) => {
                let narrowed = self.catalog.for_chain(chain);
                if narrowed.is_empty() {
                    return Err(RunError::UnknownChain(chain.to_string()));
                }
                narrowed
            }
            None => self.catalog.clone(),
        };

        let selected = {
            let mut rng = rand::rng();
            select_locations(&catalog, scope, self.settings.sample_size, &mut rng)
        };

        if !self.settings.dry_run {
            self.repository
                .ping()
                .await
                .map_err(RunError::PersistenceUnavailable)?;
        }

        let observed_on = Utc::now().date_naive();
        tracing::info!(
            %scope,
            %observed_on,
            locations = selected.len(),
            dry_run = self.settings.dry_run,
            "starting scrape run"
        );

        // Launches are spaced by the delay before entering the buffer, so
        // concurrent fetches still start at least `delay` apart.
        let delay = self.settings.inter_request_delay;
        let results: Vec<ScrapeResult> = stream::iter(selected.into_iter().enumerate())
            .then(move |(index, location)| async move {
                if index > 0 && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                location
            })
            .map(move |location| async move { self.scrape_location(&location, observed_on).await })
            .buffered(self.settings.max_concurrent.max(1))
            .try_collect()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "persistence lost mid-run; aborting");
                RunError::PersistenceUnavailable(e)
            })?;

        let attempted = results.len();
        let succeeded = results.iter().filter(|r| r.success).count();
        tracing::info!(%scope, attempted, succeeded, "scrape run finished");

        Ok(RunSummary {
            scope,
            observed_on,
            attempted,
            succeeded,
            results,
        })
    }

    async fn scrape_location(
        &self,
        location: &CatalogLocation,
        observed_on: NaiveDate,
    ) -> Result<ScrapeResult, RepositoryError> {
        let profile = self.catalog.chain(&location.chain);
        let result = if profile.is_some_and(|p| !p.has_live_scraper) {
            self.record_fallback(location, profile, observed_on).await?
        } else {
            self.scrape_live(location, profile, observed_on).await?
        };

        if result.success {
            tracing::info!(
                chain = %result.chain,
                zip = %result.zip_code,
                observations = result.observation_count,
                source = %result.source,
                stage = ?LocationStage::Done,
                "location scraped"
            );
        } else {
            tracing::warn!(
                chain = %result.chain,
                zip = %result.zip_code,
                url = %result.url,
                last_stage = ?result.stage,
                error = result.error.as_deref().unwrap_or_default(),
                "location failed"
            );
        }
        Ok(result)
    }

    async fn scrape_live(
        &self,
        location: &CatalogLocation,
        profile: Option<&ChainProfile>,
        observed_on: NaiveDate,
    ) -> Result<ScrapeResult, RepositoryError> {
        let mut stage = LocationStage::Pending;

        let request = match self.formatter.format_location(location) {
            Ok(request) => request,
            Err(e) => {
                return Ok(ScrapeResult::failed(
                    location,
                    &location.url_template,
                    stage,
                    e.to_string(),
                ))
            }
        };
        stage = LocationStage::Formatted;
        let url = request.url.clone();

        let extractor = ProductExtractor::for_chain(profile);
        let verifier = LocationVerifier::for_chain(profile);
        let (extractor, verifier) = match (extractor, verifier) {
            (Ok(e), Ok(v)) => (e, v),
            (Err(e), _) | (_, Err(e)) => {
                return Ok(ScrapeResult::failed(location, &url, stage, e.to_string()))
            }
        };

        let options = FetchOptions {
            javascript: profile.is_some_and(|p| p.javascript),
            selectors: profile
                .and_then(|p| p.product_selector.clone())
                .into_iter()
                .collect(),
        };
        let page = match self.fetcher.fetch(&request, &options).await {
            Ok(page) => page,
            Err(e) => return Ok(ScrapeResult::failed(location, &url, stage, e.to_string())),
        };
        stage = LocationStage::Fetched;

        let observations = match extractor.extract(&page.content) {
            Ok(observations) => observations,
            Err(e) => return Ok(ScrapeResult::failed(location, &url, stage, e.to_string())),
        };
        stage = LocationStage::Extracted;
        tracing::debug!(
            chain = %location.chain,
            zip = %location.zip_code,
            found = observations.len(),
            ?stage,
            "observations extracted"
        );

        let verification = verifier.verify(&page.content, &location.zip_code);
        if !verification.verified {
            // Unverified content never reaches the repository.
            let mut result = ScrapeResult::failed(
                location,
                &url,
                LocationStage::Rejected,
                UNVERIFIED_REASON.to_string(),
            );
            result.actual_zip = verification.actual_location;
            return Ok(result);
        }

        let observations = collapse_by_egg_type(observations);
        let mut result = ScrapeResult {
            chain: location.chain.clone(),
            zip_code: location.zip_code.clone(),
            url,
            observation_count: observations.len(),
            success: true,
            error: None,
            stage: LocationStage::Verified,
            source: ObservationSource::Live,
            actual_zip: verification.actual_location,
        };
        if self.settings.dry_run {
            return Ok(result);
        }

        self.persist(&mut result, location, observed_on, &observations)
            .await?;
        Ok(result)
    }

    async fn record_fallback(
        &self,
        location: &CatalogLocation,
        profile: Option<&ChainProfile>,
        observed_on: NaiveDate,
    ) -> Result<ScrapeResult, RepositoryError> {
        let url = self
            .formatter
            .format_url(&location.url_template, &location.chain, &location.zip_code)
            .unwrap_or_else(|_| location.url_template.clone());

        let observations: Vec<PriceObservation> = profile
            .and_then(|p| p.fallback_prices.as_ref())
            .map(|prices| {
                prices
                    .entries()
                    .into_iter()
                    .map(|(egg_type, price)| PriceObservation {
                        price,
                        egg_type,
                        in_stock: true,
                    })
                    .collect()
            })
            .unwrap_or_default();

        if observations.is_empty() {
            return Ok(ScrapeResult::failed(
                location,
                &url,
                LocationStage::Pending,
                NO_LIVE_SCRAPER_REASON.to_string(),
            ));
        }

        let mut result = ScrapeResult {
            chain: location.chain.clone(),
            zip_code: location.zip_code.clone(),
            url,
            observation_count: observations.len(),
            success: true,
            error: None,
            stage: LocationStage::Pending,
            source: ObservationSource::FallbackEstimate,
            actual_zip: None,
        };
        if self.settings.dry_run {
            return Ok(result);
        }

        self.persist(&mut result, location, observed_on, &observations)
            .await?;
        Ok(result)
    }

    async fn persist(
        &self,
        result: &mut ScrapeResult,
        location: &CatalogLocation,
        observed_on: NaiveDate,
        observations: &[PriceObservation],
    ) -> Result<(), RepositoryError> {
        let report = self
            .repository
            .persist_location(location, observed_on, observations, result.source)
            .await?;

        result.stage = LocationStage::Persisted;
        result.observation_count = report.written;
        if !report.errors.is_empty() {
            result.error = Some(report.errors.join("; "));
        }
        // Skipped estimates still count: the key already holds a live price.
        result.success = report.written + report.skipped > 0;
        Ok(())
    }
}

/// One observation per egg type: in-stock beats out-of-stock, then the
/// lowest price wins.
#[must_use]
pub fn collapse_by_egg_type(observations: Vec<PriceObservation>) -> Vec<PriceObservation> {
    let mut best: BTreeMap<EggType, PriceObservation> = BTreeMap::new();
    for observation in observations {
        match best.get(&observation.egg_type) {
            Some(current)
                if (current.in_stock, std::cmp::Reverse(current.price))
                    >= (observation.in_stock, std::cmp::Reverse(observation.price)) => {}
            _ => {
                best.insert(observation.egg_type, observation);
            }
        }
    }
    best.into_values().collect()
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
