use axum::{
    extract::{Query, State},
    Extension, Json,
};
use mktsync_sync::{CheckReport, CheckRequest, SyncOrchestrator, SyncRequest, SyncRun};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{run_detached, ApiError, ApiResponse, AppState};

/// Longest look-back accepted by the check endpoint.
const MAX_CHECK_HOURS: i64 = 24 * 30;

#[derive(Debug, Deserialize)]
pub(super) struct CheckQuery {
    pub account_id: Option<Uuid>,
    pub owner_id: Option<String>,
    pub hours: Option<i64>,
}

pub(super) async fn run_sync(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Option<Json<SyncRequest>>,
) -> Result<Json<ApiResponse<SyncRun>>, ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    if let (Some(from), Some(to)) = (request.window.from, request.window.to) {
        if from > to {
            return Err(ApiError::new(
                req_id.0,
                "validation_error",
                "from must not be after to",
            ));
        }
    }

    let run = run_detached(&state, &req_id.0, move |state| async move {
        SyncOrchestrator::from_config(&state.repo, &state.api, &state.config)
            .run(request)
            .await
    })
    .await?;

    Ok(Json(ApiResponse::new(run, req_id.0)))
}

pub(super) async fn check_new_orders(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<ApiResponse<CheckReport>>, ApiError> {
    if let Some(hours) = query.hours {
        if !(1..=MAX_CHECK_HOURS).contains(&hours) {
            return Err(ApiError::new(
                req_id.0,
                "validation_error",
                format!("hours must be between 1 and {MAX_CHECK_HOURS}"),
            ));
        }
    }

    let request = CheckRequest {
        account_ids: query.account_id.into_iter().collect(),
        owner_id: query.owner_id,
        hours: query.hours,
    };
    let report = run_detached(&state, &req_id.0, move |state| async move {
        SyncOrchestrator::from_config(&state.repo, &state.api, &state.config)
            .check_new_orders(request)
            .await
    })
    .await?;

    Ok(Json(ApiResponse::new(report, req_id.0)))
}
