use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use eggdb_core::FallbackPrices;
use eggdb_scraper::{FetchedPage, FormattedRequest, ScraperError};
use rust_decimal::Decimal;

use super::*;
use crate::repository::PersistReport;

fn price(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn location(chain: &str, zip: &str, template: &str) -> CatalogLocation {
    CatalogLocation {
        chain: chain.to_string(),
        address: format!("1 Main St, Los Angeles, CA {zip}"),
        zip_code: zip.to_string(),
        latitude: None,
        longitude: None,
        url_template: template.to_string(),
        forwarded_ip: None,
    }
}

fn store_page(zip: &str) -> String {
    format!(
        "<header>Your store: Echo Park, Los Angeles, CA {zip}</header>\
         <ul><li>Large Eggs 12 ct $4.25</li>\
         <li>Organic Eggs 12 ct $6.10, Out of stock</li></ul>"
    )
}

/// Serves canned content by URL; URLs listed in `failing` always error.
#[derive(Default)]
struct FakeFetcher {
    pages: HashMap<String, String>,
    failing: Vec<String>,
    calls: AtomicUsize,
    started: Mutex<Vec<Instant>>,
}

impl FakeFetcher {
    fn with_page(mut self, url: &str, content: String) -> Self {
        self.pages.insert(url.to_string(), content);
        self
    }

    fn with_failure(mut self, url: &str) -> Self {
        self.failing.push(url.to_string());
        self
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(
        &self,
        request: &FormattedRequest,
        _options: &FetchOptions,
    ) -> Result<FetchedPage, ScraperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.lock().unwrap().push(Instant::now());
        if self.failing.contains(&request.url) {
            return Err(ScraperError::Network {
                url: request.url.clone(),
                attempts: 4,
                source: Box::new(ScraperError::UnexpectedStatus {
                    status: 503,
                    url: request.url.clone(),
                }),
            });
        }
        match self.pages.get(&request.url) {
            Some(content) => Ok(FetchedPage {
                status: 200,
                content: content.clone(),
                headers: Default::default(),
            }),
            None => Err(ScraperError::UnexpectedStatus {
                status: 404,
                url: request.url.clone(),
            }),
        }
    }
}

type Written = (String, String, NaiveDate, PriceObservation, ObservationSource);

#[derive(Default)]
struct FakeRepository {
    written: Mutex<Vec<Written>>,
    unreachable: AtomicBool,
    persist_calls: AtomicUsize,
    /// The 1-based `persist_location` call from which the pool is gone.
    lost_at_call: Option<usize>,
}

#[async_trait]
impl PriceRepository for FakeRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    async fn persist_location(
        &self,
        location: &CatalogLocation,
        observed_on: NaiveDate,
        observations: &[PriceObservation],
        source: ObservationSource,
    ) -> Result<PersistReport, RepositoryError> {
        let call = self.persist_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.lost_at_call.is_some_and(|lost| call >= lost) {
            return Err(RepositoryError::Unavailable(sqlx::Error::PoolClosed));
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(sqlx::Error::PoolTimedOut));
        }
        let mut written = self.written.lock().unwrap();
        for observation in observations {
            written.push((
                location.chain.clone(),
                location.zip_code.clone(),
                observed_on,
                observation.clone(),
                source,
            ));
        }
        Ok(PersistReport {
            written: observations.len(),
            ..PersistReport::default()
        })
    }
}

fn orchestrator(
    catalog: Catalog,
    fetcher: Arc<FakeFetcher>,
    repository: Arc<FakeRepository>,
) -> ScrapeOrchestrator {
    ScrapeOrchestrator::new(catalog, fetcher, repository, OrchestratorSettings::default())
}

#[tokio::test]
async fn end_to_end_single_location_writes_two_rows() {
    let catalog = Catalog::new(
        Vec::new(),
        vec![location("Acme", "90026", "https://acme.example/eggs")],
    );
    let fetcher = Arc::new(
        FakeFetcher::default().with_page(
            "https://acme.example/eggs?zipCode=90026",
            store_page("90026"),
        ),
    );
    let repository = Arc::new(FakeRepository::default());

    let summary = orchestrator(catalog, fetcher, Arc::clone(&repository))
        .run(ScrapeScope::Full, None)
        .await
        .unwrap();

    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.succeeded, 1);
    let result = &summary.results[0];
    assert_eq!(result.url, "https://acme.example/eggs?zipCode=90026");
    assert_eq!(result.observation_count, 2);
    assert_eq!(result.stage, LocationStage::Persisted);
    assert_eq!(result.actual_zip.as_deref(), Some("90026"));

    let written = repository.written.lock().unwrap();
    assert_eq!(written.len(), 2);
    let today = Utc::now().date_naive();
    assert!(written.iter().all(|w| w.2 == today && w.4 == ObservationSource::Live));
    assert_eq!(
        written[0].3,
        PriceObservation {
            price: price("4.25"),
            egg_type: EggType::Regular,
            in_stock: true,
        }
    );
    assert_eq!(
        written[1].3,
        PriceObservation {
            price: price("6.10"),
            egg_type: EggType::Organic,
            in_stock: false,
        }
    );
}

#[tokio::test]
async fn one_failing_fetch_does_not_affect_siblings() {
    let locations: Vec<CatalogLocation> = (1..=5)
        .map(|i| location("Acme", &format!("9000{i}"), "https://acme.example/eggs"))
        .collect();
    let mut fetcher = FakeFetcher::default();
    for loc in &locations {
        let url = format!("https://acme.example/eggs?zipCode={}", loc.zip_code);
        fetcher = fetcher.with_page(&url, store_page(&loc.zip_code));
    }
    let fetcher = Arc::new(fetcher.with_failure("https://acme.example/eggs?zipCode=90003"));
    let repository = Arc::new(FakeRepository::default());

    let summary = orchestrator(
        Catalog::new(Vec::new(), locations),
        fetcher,
        Arc::clone(&repository),
    )
    .run(ScrapeScope::Full, None)
    .await
    .unwrap();

    assert_eq!(summary.attempted, 5);
    assert_eq!(summary.succeeded, 4);
    let zips: Vec<&str> = summary.results.iter().map(|r| r.zip_code.as_str()).collect();
    assert_eq!(zips, ["90001", "90002", "90003", "90004", "90005"]);
    let third = &summary.results[2];
    assert!(!third.success);
    assert_eq!(third.stage, LocationStage::Formatted);
    assert!(third.error.as_deref().unwrap().contains("network error"));
    assert!(summary
        .results
        .iter()
        .enumerate()
        .all(|(i, r)| r.success == (i != 2)));
    assert_eq!(repository.written.lock().unwrap().len(), 8);
}

#[tokio::test]
async fn unverified_location_writes_nothing() {
    let catalog = Catalog::new(
        Vec::new(),
        vec![location("Acme", "90026", "https://acme.example/eggs")],
    );
    // The site ignored the zip hint and rendered a different store.
    let fetcher = Arc::new(FakeFetcher::default().with_page(
        "https://acme.example/eggs?zipCode=90026",
        store_page("10001"),
    ));
    let repository = Arc::new(FakeRepository::default());

    let summary = orchestrator(catalog, fetcher, Arc::clone(&repository))
        .run(ScrapeScope::Full, None)
        .await
        .unwrap();

    let result = &summary.results[0];
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some(UNVERIFIED_REASON));
    assert_eq!(result.stage, LocationStage::Rejected);
    assert_eq!(result.actual_zip.as_deref(), Some("10001"));
    assert_eq!(result.observation_count, 0);
    assert!(repository.written.lock().unwrap().is_empty());
}

#[tokio::test]
async fn page_without_location_signal_is_unverified() {
    let catalog = Catalog::new(
        Vec::new(),
        vec![location("Acme", "90026", "https://acme.example/eggs")],
    );
    let fetcher = Arc::new(FakeFetcher::default().with_page(
        "https://acme.example/eggs?zipCode=90026",
        "<li>Large Eggs $4.25</li>".to_string(),
    ));
    let repository = Arc::new(FakeRepository::default());

    let summary = orchestrator(catalog, fetcher, Arc::clone(&repository))
        .run(ScrapeScope::Full, None)
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.results[0].actual_zip, None);
    assert!(repository.written.lock().unwrap().is_empty());
}

#[tokio::test]
async fn extraction_failure_is_contained() {
    let catalog = Catalog::new(
        Vec::new(),
        vec![location("Acme", "90026", "https://acme.example/eggs")],
    );
    let fetcher = Arc::new(FakeFetcher::default().with_page(
        "https://acme.example/eggs?zipCode=90026",
        "Your store: 90026. Whole Milk $3.49".to_string(),
    ));
    let summary = orchestrator(catalog, fetcher, Arc::new(FakeRepository::default()))
        .run(ScrapeScope::Full, None)
        .await
        .unwrap();
    let result = &summary.results[0];
    assert!(!result.success);
    assert_eq!(result.stage, LocationStage::Fetched);
    assert!(result.error.as_deref().unwrap().contains("no egg products"));
}

#[tokio::test]
async fn unreachable_repository_aborts_before_fetching() {
    let catalog = Catalog::new(
        Vec::new(),
        vec![location("Acme", "90026", "https://acme.example/eggs")],
    );
    let fetcher = Arc::new(FakeFetcher::default());
    let repository = Arc::new(FakeRepository::default());
    repository.unreachable.store(true, Ordering::SeqCst);

    let err = orchestrator(catalog, Arc::clone(&fetcher), repository)
        .run(ScrapeScope::Full, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::PersistenceUnavailable(_)));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn repository_lost_mid_run_aborts_the_run() {
    let catalog = Catalog::new(
        Vec::new(),
        vec![
            location("Acme", "90026", "https://acme.example/eggs"),
            location("Acme", "90027", "https://acme.example/eggs"),
            location("Acme", "90028", "https://acme.example/eggs"),
        ],
    );
    let fetcher = Arc::new(
        FakeFetcher::default()
            .with_page("https://acme.example/eggs?zipCode=90026", store_page("90026"))
            .with_page("https://acme.example/eggs?zipCode=90027", store_page("90027"))
            .with_page("https://acme.example/eggs?zipCode=90028", store_page("90028")),
    );
    let repository = Arc::new(FakeRepository {
        lost_at_call: Some(2),
        ..FakeRepository::default()
    });

    let err = orchestrator(catalog, fetcher, Arc::clone(&repository))
        .run(ScrapeScope::Full, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::PersistenceUnavailable(RepositoryError::Unavailable(_))
    ));
    // The first location landed before the pool went away; nothing after it did.
    let written = repository.written.lock().unwrap();
    assert_eq!(written.len(), 2);
    assert!(written.iter().all(|w| w.1 == "90026"));
}

#[test]
fn run_future_is_send() {
    fn assert_send<T: Send>(_: T) {}

    let catalog = Catalog::new(
        Vec::new(),
        vec![location("Acme", "90026", "https://acme.example/eggs")],
    );
    let runner = orchestrator(
        catalog,
        Arc::new(FakeFetcher::default()),
        Arc::new(FakeRepository::default()),
    );
    assert_send(runner.run(ScrapeScope::Full, Some("Acme")));
}

#[tokio::test]
async fn concurrent_launches_respect_inter_request_delay() {
    let zips = ["90026", "90027", "90028"];
    let catalog = Catalog::new(
        Vec::new(),
        zips.iter()
            .map(|zip| location("Acme", zip, "https://acme.example/eggs"))
            .collect(),
    );
    let fetcher = zips.iter().fold(FakeFetcher::default(), |fetcher, zip| {
        fetcher.with_page(&format!("https://acme.example/eggs?zipCode={zip}"), store_page(zip))
    });
    let fetcher = Arc::new(fetcher);
    let delay = Duration::from_millis(40);
    let settings = OrchestratorSettings {
        max_concurrent: 2,
        inter_request_delay: delay,
        ..OrchestratorSettings::default()
    };

    let summary = ScrapeOrchestrator::new(
        catalog,
        fetcher.clone(),
        Arc::new(FakeRepository::default()),
        settings,
    )
    .run(ScrapeScope::Full, None)
    .await
    .unwrap();

    let order: Vec<&str> = summary.results.iter().map(|r| r.zip_code.as_str()).collect();
    assert_eq!(order, zips);
    let started = fetcher.started.lock().unwrap();
    assert_eq!(started.len(), 3);
    // The first fetch is polled just after the second launch's timer is armed.
    let slack = Duration::from_millis(5);
    for pair in started.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= delay - slack);
    }
}

#[tokio::test]
async fn dry_run_skips_persistence_and_ping() {
    let catalog = Catalog::new(
        Vec::new(),
        vec![location("Acme", "90026", "https://acme.example/eggs")],
    );
    let fetcher = Arc::new(FakeFetcher::default().with_page(
        "https://acme.example/eggs?zipCode=90026",
        store_page("90026"),
    ));
    let repository = Arc::new(FakeRepository::default());
    repository.unreachable.store(true, Ordering::SeqCst);

    let settings = OrchestratorSettings {
        dry_run: true,
        ..OrchestratorSettings::default()
    };
    let shared: Arc<dyn PriceRepository> = repository.clone();
    let runner = ScrapeOrchestrator::new(catalog, fetcher, shared, settings);
    assert!(runner.is_dry_run());
    let summary = runner.run(ScrapeScope::Full, None).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.results[0].stage, LocationStage::Verified);
    assert_eq!(summary.results[0].observation_count, 2);
    assert!(repository.written.lock().unwrap().is_empty());
}

#[tokio::test]
async fn fallback_chain_writes_estimates_without_fetching() {
    let mut corner = ChainProfile::named("Corner Grocer");
    corner.has_live_scraper = false;
    corner.fallback_prices = Some(FallbackPrices {
        regular: Some(price("3.49")),
        organic: None,
    });
    let catalog = Catalog::new(
        vec![corner],
        vec![location("Corner Grocer", "62701", "https://corner.example/dairy")],
    );
    let fetcher = Arc::new(FakeFetcher::default());
    let repository = Arc::new(FakeRepository::default());

    let summary = orchestrator(catalog, Arc::clone(&fetcher), Arc::clone(&repository))
        .run(ScrapeScope::Full, None)
        .await
        .unwrap();

    let result = &summary.results[0];
    assert!(result.success);
    assert_eq!(result.source, ObservationSource::FallbackEstimate);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    let written = repository.written.lock().unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].4, ObservationSource::FallbackEstimate);
    assert_eq!(written[0].3.price, price("3.49"));
}

#[tokio::test]
async fn chain_without_scraper_or_estimates_fails() {
    let mut dead = ChainProfile::named("Corner Grocer");
    dead.has_live_scraper = false;
    let catalog = Catalog::new(
        vec![dead],
        vec![location("Corner Grocer", "62701", "https://corner.example/dairy")],
    );
    let summary = orchestrator(
        catalog,
        Arc::new(FakeFetcher::default()),
        Arc::new(FakeRepository::default()),
    )
    .run(ScrapeScope::Full, None)
    .await
    .unwrap();
    assert!(!summary.results[0].success);
    assert_eq!(
        summary.results[0].error.as_deref(),
        Some(NO_LIVE_SCRAPER_REASON)
    );
}

#[tokio::test]
async fn chain_filter_narrows_and_rejects_unknown() {
    let catalog = Catalog::new(
        Vec::new(),
        vec![
            location("Acme", "90026", "https://acme.example/eggs"),
            location("Other Mart", "90026", "https://other.example/eggs"),
        ],
    );
    let fetcher = Arc::new(FakeFetcher::default().with_page(
        "https://acme.example/eggs?zipCode=90026",
        store_page("90026"),
    ));
    let runner = orchestrator(catalog, fetcher, Arc::new(FakeRepository::default()));

    let summary = runner.run(ScrapeScope::Full, Some("acme")).await.unwrap();
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.results[0].chain, "Acme");

    let err = runner
        .run(ScrapeScope::Full, Some("Nobody"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::UnknownChain(ref c) if c == "Nobody"));
}

#[tokio::test]
async fn sample_scope_caps_attempts() {
    let locations: Vec<CatalogLocation> = (0..10)
        .map(|i| location("Acme", &format!("{:05}", 60_600 + i), "https://acme.example/eggs"))
        .collect();
    let settings = OrchestratorSettings {
        sample_size: 3,
        max_concurrent: 2,
        ..OrchestratorSettings::default()
    };
    let runner = ScrapeOrchestrator::new(
        Catalog::new(Vec::new(), locations),
        Arc::new(FakeFetcher::default()),
        Arc::new(FakeRepository::default()),
        settings,
    );
    let summary = runner.run(ScrapeScope::Sample, None).await.unwrap();
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.scope, ScrapeScope::Sample);
}

#[test]
fn collapse_prefers_in_stock_then_lowest_price() {
    let observations = vec![
        PriceObservation {
            price: price("3.99"),
            egg_type: EggType::Regular,
            in_stock: false,
        },
        PriceObservation {
            price: price("4.49"),
            egg_type: EggType::Regular,
            in_stock: true,
        },
        PriceObservation {
            price: price("4.19"),
            egg_type: EggType::Regular,
            in_stock: true,
        },
        PriceObservation {
            price: price("6.99"),
            egg_type: EggType::Organic,
            in_stock: false,
        },
    ];
    let collapsed = collapse_by_egg_type(observations);
    assert_eq!(collapsed.len(), 2);
    assert_eq!(collapsed[0].egg_type, EggType::Regular);
    assert_eq!(collapsed[0].price, price("4.19"));
    assert!(collapsed[0].in_stock);
    assert_eq!(collapsed[1].egg_type, EggType::Organic);
    assert_eq!(collapsed[1].price, price("6.99"));
}

#[test]
fn scrape_result_serializes_camel_case() {
    let result = ScrapeResult::failed(
        &location("Acme", "90026", "https://acme.example/eggs"),
        "https://acme.example/eggs?zipCode=90026",
        LocationStage::Rejected,
        UNVERIFIED_REASON.to_string(),
    );
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["zipCode"], "90026");
    assert_eq!(json["observationCount"], 0);
    assert_eq!(json["stage"], "rejected");
    assert_eq!(json["source"], "live");
    assert!(json.get("actualZip").is_none());
}
