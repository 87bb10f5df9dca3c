use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use eggdb_collector::{run_and_record, RunError, RunSummary, ScrapeScope, TriggerSource};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct ScrapeQuery {
    pub scope: Option<String>,
    pub chain: Option<String>,
}

/// Body returned by the manual trigger.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TriggerResponse {
    success: bool,
    scraped_count: usize,
    total_attempted: usize,
    results: Vec<TriggerResultItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TriggerResultItem {
    store: String,
    zip_code: String,
    success: bool,
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&RunSummary> for TriggerResponse {
    fn from(summary: &RunSummary) -> Self {
        Self {
            // Mirrors the audit row: a run is failed only when every location failed.
            success: summary.attempted == 0 || summary.succeeded > 0,
            scraped_count: summary.succeeded,
            total_attempted: summary.attempted,
            results: summary
                .results
                .iter()
                .map(|result| TriggerResultItem {
                    store: result.chain.clone(),
                    zip_code: result.zip_code.clone(),
                    success: result.success,
                    count: result.observation_count,
                    error: result.error.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ScrapeRunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ScrapeRunItem {
    run_id: Uuid,
    scope: String,
    trigger_source: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    attempted: i32,
    succeeded: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

pub(super) async fn trigger_scrape(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ScrapeQuery>,
) -> Result<Json<TriggerResponse>, ApiError> {
    let scope = match query.scope.as_deref() {
        None | Some("") => ScrapeScope::Sample,
        Some(raw) => raw
            .parse::<ScrapeScope>()
            .map_err(|e| map_run_error(req_id.0.clone(), &e))?,
    };

    let Ok(_guard) = state.run_lock.try_lock() else {
        return Err(ApiError::new(
            req_id.0,
            "conflict",
            "a scrape run is already in progress",
        ));
    };

    tracing::info!(%scope, chain = ?query.chain, request_id = %req_id.0, "manual scrape triggered");
    let recorded = run_and_record(
        &state.pool,
        &state.orchestrator,
        scope,
        query.chain.as_deref(),
        TriggerSource::Api,
    )
    .await
    .map_err(|e| map_run_error(req_id.0.clone(), &e))?;

    tracing::info!(
        run_id = recorded.run_id,
        attempted = recorded.summary.attempted,
        succeeded = recorded.summary.succeeded,
        "manual scrape finished"
    );
    Ok(Json(TriggerResponse::from(&recorded.summary)))
}

pub(super) async fn list_scrape_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ScrapeRunsQuery>,
) -> Result<Json<ApiResponse<Vec<ScrapeRunItem>>>, ApiError> {
    let rows = eggdb_db::list_scrape_runs(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| ScrapeRunItem {
            run_id: row.public_id,
            scope: row.scope,
            trigger_source: row.trigger_source,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            attempted: row.attempted,
            succeeded: row.succeeded,
            error_message: row.error_message,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

fn map_run_error(request_id: String, error: &RunError) -> ApiError {
    match error {
        RunError::InvalidScope(_) => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        RunError::UnknownChain(_) => ApiError::new(request_id, "not_found", error.to_string()),
        RunError::PersistenceUnavailable(_) => {
            tracing::error!(error = %error, "scrape run aborted");
            ApiError::new(
                request_id,
                "service_unavailable",
                "persistence layer unavailable",
            )
        }
        RunError::Db(e) => map_db_error(request_id, e),
    }
}
