//! Admin endpoints for the CRM replica: status, manual syncs and run history.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crm_replica_core::sync::{
    age_window, EnsureSyncResult, SyncAllResult, SyncRun, SyncStatusReport, MAX_AGE_HOURS_LIMIT,
};

use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;

const DEFAULT_RUNS_LIMIT: i64 = 50;
const MAX_RUNS_LIMIT: i64 = 500;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncRequest {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalSyncRequest {
    pub max_age_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelInFlightResponse {
    pub cancelled: usize,
}

fn max_age_or_default(state: &AppState, requested: Option<i64>) -> ApiResult<i64> {
    match requested {
        Some(hours) => age_window(hours)
            .map(|_| hours)
            .map_err(|_| {
                ApiError::BadRequest(format!(
                    "maxAgeHours must be between 1 and {}",
                    MAX_AGE_HOURS_LIMIT
                ))
            }),
        None => Ok(state.orchestrator.config().max_age_hours),
    }
}

async fn get_sync_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<SyncStatusReport>> {
    Ok(Json(state.orchestrator.get_status()?))
}

/// Runs a full sync of every entity type and waits for the results.
async fn run_full_sync(
    State(state): State<Arc<AppState>>,
    body: Option<Json<FullSyncRequest>>,
) -> ApiResult<Json<SyncAllResult>> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    if request.limit == Some(0) {
        return Err(ApiError::BadRequest(
            "limit must be greater than zero".to_string(),
        ));
    }
    info!("[CrmSync] Full sync requested (limit={:?})", request.limit);
    Ok(Json(state.orchestrator.sync_all(request.limit).await))
}

async fn run_incremental_sync(
    State(state): State<Arc<AppState>>,
    body: Option<Json<IncrementalSyncRequest>>,
) -> ApiResult<Json<SyncAllResult>> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let max_age_hours = max_age_or_default(&state, request.max_age_hours)?;
    info!(
        "[CrmSync] Incremental sync requested (maxAgeHours={})",
        max_age_hours
    );
    Ok(Json(
        state.orchestrator.sync_all_incremental(max_age_hours).await,
    ))
}

/// Starts an incremental sync in the background. Returns 202 immediately.
async fn trigger_incremental_sync(
    State(state): State<Arc<AppState>>,
    body: Option<Json<IncrementalSyncRequest>>,
) -> ApiResult<StatusCode> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let max_age_hours = max_age_or_default(&state, request.max_age_hours)?;
    state.orchestrator.trigger_incremental_sync(max_age_hours);
    Ok(StatusCode::ACCEPTED)
}

async fn ensure_data_synced(State(state): State<Arc<AppState>>) -> Json<EnsureSyncResult> {
    let max_age_hours = state.orchestrator.config().max_age_hours;
    Json(state.orchestrator.ensure_data_synced(max_age_hours))
}

async fn list_sync_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunsQuery>,
) -> ApiResult<Json<Vec<SyncRun>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RUNS_LIMIT)
        .clamp(1, MAX_RUNS_LIMIT);
    debug!("[CrmSync] Listing recent sync runs (limit={})", limit);
    Ok(Json(state.runs.list_recent_runs(limit)?))
}

async fn cancel_in_flight(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<CancelInFlightResponse>> {
    let cancelled = state.runs.cancel_in_flight().await?;
    Ok(Json(CancelInFlightResponse { cancelled }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync/status", get(get_sync_status))
        .route("/sync/full", post(run_full_sync))
        .route("/sync/incremental", post(run_incremental_sync))
        .route(
            "/sync/incremental/trigger",
            post(trigger_incremental_sync),
        )
        .route("/sync/ensure", post(ensure_data_synced))
        .route("/sync/runs", get(list_sync_runs))
        .route("/sync/runs/cancel-in-flight", post(cancel_in_flight))
}
