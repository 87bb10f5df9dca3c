//! `scrape` command: one orchestrator run, recorded unless it is a dry run.

use std::fmt::Write as _;

use eggdb_collector::{build_orchestrator, run_and_record, RunSummary, ScrapeScope, TriggerSource};
use eggdb_core::AppConfig;
use sqlx::postgres::PgPoolOptions;

/// Runs a scrape and prints its summary.
///
/// # Errors
///
/// Returns an error if the scope is unknown, the catalog cannot be loaded,
/// the database cannot be reached (non-dry runs), or the run aborts.
/// Per-location failures are reported in the summary, not returned.
pub(crate) async fn run_scrape(
    config: &AppConfig,
    scope: &str,
    chain: Option<&str>,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let scope: ScrapeScope = scope.parse()?;
    let catalog = eggdb_core::load_catalog(&config.catalog_path)?;

    let summary = if dry_run {
        // Lazy pool: a dry run never acquires a connection.
        let pool = PgPoolOptions::new().connect_lazy(&config.database_url)?;
        let orchestrator = build_orchestrator(config, catalog, pool, true)?;
        orchestrator.run(scope, chain).await?
    } else {
        let pool = eggdb_db::connect_pool(
            &config.database_url,
            eggdb_db::PoolConfig::from_app_config(config),
        )
        .await?;
        let orchestrator = build_orchestrator(config, catalog, pool.clone(), false)?;
        let recorded =
            run_and_record(&pool, &orchestrator, scope, chain, TriggerSource::Cli).await?;
        tracing::info!(run_id = recorded.run_id, "scrape run recorded");
        recorded.summary
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_summary(&summary, dry_run));
    }
    Ok(())
}

pub(crate) fn render_summary(summary: &RunSummary, dry_run: bool) -> String {
    let mut out = String::new();
    let mode = if dry_run { " (dry run)" } else { "" };
    let _ = writeln!(
        out,
        "{} scrape on {}{mode}: {}/{} locations succeeded",
        summary.scope, summary.observed_on, summary.succeeded, summary.attempted
    );
    for result in &summary.results {
        let status = if result.success { "ok" } else { "FAIL" };
        let _ = write!(
            out,
            "  {status:<4} {:<20} {}  {} observation(s)",
            result.chain, result.zip_code, result.observation_count
        );
        if let Some(error) = &result.error {
            let _ = write!(out, "  {error}");
        }
        out.push('\n');
    }
    out
}
