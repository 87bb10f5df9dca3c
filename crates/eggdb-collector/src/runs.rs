//! Wraps an orchestrator run in a `scrape_runs` audit row.

use sqlx::PgPool;

use crate::error::RunError;
use crate::orchestrator::{RunSummary, ScrapeOrchestrator};
use crate::selection::ScrapeScope;

/// Who asked for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Scheduler,
    Api,
    Cli,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerSource::Scheduler => "scheduler",
            TriggerSource::Api => "api",
            TriggerSource::Cli => "cli",
        }
    }
}

/// A finished run and the audit row that recorded it.
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub run_id: i64,
    pub summary: RunSummary,
}

/// Create → start → run → complete/fail.
///
/// A run whose every location failed is still returned as `Ok`, but its
/// audit row is marked `failed`.
///
/// # Errors
///
/// Returns [`RunError::Db`] if the audit row cannot be created or started,
/// and whatever [`ScrapeOrchestrator::run`] returns when the run aborts.
pub async fn run_and_record(
    pool: &PgPool,
    orchestrator: &ScrapeOrchestrator,
    scope: ScrapeScope,
    chain_filter: Option<&str>,
    trigger: TriggerSource,
) -> Result<RecordedRun, RunError> {
    let run = eggdb_db::create_scrape_run(pool, scope.as_str(), trigger.as_str()).await?;
    if let Err(e) = eggdb_db::start_scrape_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, &e.to_string()).await;
        return Err(e.into());
    }

    let summary = match orchestrator.run(scope, chain_filter).await {
        Ok(summary) => summary,
        Err(e) => {
            fail_run_best_effort(pool, run.id, &e.to_string()).await;
            return Err(e);
        }
    };

    if summary.attempted > 0 && summary.succeeded == 0 {
        let message = format!("all {} locations failed", summary.attempted);
        tracing::warn!(run_id = run.id, %scope, "{message}");
        fail_run_best_effort(pool, run.id, &message).await;
        return Ok(RecordedRun {
            run_id: run.id,
            summary,
        });
    }

    let attempted = i32::try_from(summary.attempted).unwrap_or(i32::MAX);
    let succeeded = i32::try_from(summary.succeeded).unwrap_or(i32::MAX);
    if let Err(e) = eggdb_db::complete_scrape_run(pool, run.id, attempted, succeeded).await {
        fail_run_best_effort(pool, run.id, &e.to_string()).await;
        return Err(e.into());
    }

    Ok(RecordedRun {
        run_id: run.id,
        summary,
    })
}

/// Marks the run failed, logging instead of propagating a second error.
async fn fail_run_best_effort(pool: &PgPool, run_id: i64, message: &str) {
    if let Err(e) = eggdb_db::fail_scrape_run(pool, run_id, message).await {
        tracing::error!(run_id, error = %e, "failed to mark scrape run as failed");
    }
}
