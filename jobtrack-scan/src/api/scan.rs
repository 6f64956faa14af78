//! Scan trigger and audit endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};
use crate::models::{ScanRun, ScanSummary};
use crate::services::application_service::DEFAULT_SCAN_RUN_LIMIT;
use crate::AppState;

/// Largest number of scan runs listed at once
const MAX_SCAN_RUN_LIMIT: i64 = 100;

/// POST /job-tracker/scan
///
/// Runs a scan to completion and returns its summary. The scan runs in its
/// own task so a client that hangs up does not abort it half way.
pub async fn trigger_scan(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<ScanSummary>)> {
    let scan_state = state.clone();
    let result = tokio::spawn(async move {
        let result = scan_state
            .scan_service
            .run_scan(None, CancellationToken::new())
            .await;
        scan_state.record_scan_result(&result).await;
        result
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Scan task failed: {}", e)))?;

    Ok((StatusCode::ACCEPTED, Json(result?)))
}

#[derive(Debug, Deserialize)]
pub struct ScanRunsQuery {
    pub limit: Option<i64>,
}

/// GET /job-tracker/scans
///
/// Most recent scan runs, newest first.
pub async fn list_scan_runs(
    State(state): State<AppState>,
    Query(query): Query<ScanRunsQuery>,
) -> ApiResult<Json<Vec<ScanRun>>> {
    let limit = query.limit.unwrap_or(DEFAULT_SCAN_RUN_LIMIT);
    if !(1..=MAX_SCAN_RUN_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_SCAN_RUN_LIMIT
        )));
    }

    Ok(Json(state.applications.list_scan_runs(limit).await?))
}

pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/scan", post(trigger_scan))
        .route("/scan/progress", get(super::scan_progress_stream))
        .route("/scans", get(list_scan_runs))
}
