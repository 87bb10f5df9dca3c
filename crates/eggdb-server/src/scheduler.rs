//! Background job scheduler.
//!
//! [`ScrapeScheduler`] owns the cron scheduler for the daily sample run and
//! the weekly full run. It is created by the server process, started once,
//! and shut down after the HTTP server drains.

use eggdb_collector::{run_and_record, ScrapeScope, TriggerSource};
use eggdb_core::AppConfig;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::api::AppState;

/// Cron expressions and the on/off switch for scheduled runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub enabled: bool,
    pub sample_cron: String,
    pub full_cron: String,
}

impl ScheduleSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            enabled: config.scheduler_enabled,
            sample_cron: config.sample_cron.clone(),
            full_cron: config.full_cron.clone(),
        }
    }
}

pub struct ScrapeScheduler {
    state: AppState,
    settings: ScheduleSettings,
    inner: Option<JobScheduler>,
}

impl ScrapeScheduler {
    pub fn new(state: AppState, settings: ScheduleSettings) -> Self {
        Self {
            state,
            settings,
            inner: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_some()
    }

    /// Registers the sample and full jobs and starts the scheduler.
    ///
    /// Does nothing when scheduling is disabled or already started.
    ///
    /// # Errors
    ///
    /// Returns [`JobSchedulerError`] if a cron expression is invalid or the
    /// scheduler cannot be started.
    pub async fn start(&mut self) -> Result<(), JobSchedulerError> {
        if !self.settings.enabled {
            tracing::info!("scheduler: disabled; no scrape jobs registered");
            return Ok(());
        }
        if self.inner.is_some() {
            return Ok(());
        }

        let scheduler = JobScheduler::new().await?;
        register_scrape_job(
            &scheduler,
            &self.settings.sample_cron,
            ScrapeScope::Sample,
            self.state.clone(),
        )
        .await?;
        register_scrape_job(
            &scheduler,
            &self.settings.full_cron,
            ScrapeScope::Full,
            self.state.clone(),
        )
        .await?;
        scheduler.start().await?;

        tracing::info!(
            sample_cron = %self.settings.sample_cron,
            full_cron = %self.settings.full_cron,
            "scheduler: started"
        );
        self.inner = Some(scheduler);
        Ok(())
    }

    /// Stops every job. Safe to call when never started.
    ///
    /// # Errors
    ///
    /// Returns [`JobSchedulerError`] if the scheduler fails to shut down.
    pub async fn shutdown(&mut self) -> Result<(), JobSchedulerError> {
        if let Some(mut scheduler) = self.inner.take() {
            scheduler.shutdown().await?;
            tracing::info!("scheduler: stopped");
        }
        Ok(())
    }
}

async fn register_scrape_job(
    scheduler: &JobScheduler,
    cron: &str,
    scope: ScrapeScope,
    state: AppState,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let state = state.clone();
        Box::pin(async move {
            run_scheduled(&state, scope).await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

async fn run_scheduled(state: &AppState, scope: ScrapeScope) {
    let Ok(_guard) = state.run_lock.try_lock() else {
        tracing::warn!(%scope, "scheduler: previous run still in progress; skipping");
        return;
    };

    tracing::info!(%scope, "scheduler: starting scrape run");
    match run_and_record(
        &state.pool,
        &state.orchestrator,
        scope,
        None,
        TriggerSource::Scheduler,
    )
    .await
    {
        Ok(recorded) => tracing::info!(
            %scope,
            run_id = recorded.run_id,
            attempted = recorded.summary.attempted,
            succeeded = recorded.summary.succeeded,
            "scheduler: scrape run complete"
        ),
        Err(e) => tracing::error!(%scope, error = %e, "scheduler: scrape run failed"),
    }
}
