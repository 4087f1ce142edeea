use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use mktsync_sync::{
    CredentialManager, CredentialPolicy, MeliApi, PgRepo, RenewalOutcome, TokenSummary,
    DEFAULT_FORCE_ATTEMPTS,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{run_detached, ApiError, ApiResponse, AppState};

const MAX_FORCE_ATTEMPTS: u32 = 10;

#[derive(Debug, Deserialize)]
pub(super) struct RefreshQuery {
    pub attempts: Option<u32>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(super) enum RefreshStatus {
    Renewed,
    TransientFailure,
    Rejected,
    Removed,
}

#[derive(Debug, Serialize)]
pub(super) struct RefreshResult {
    pub account_id: Uuid,
    pub status: RefreshStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RefreshResult {
    fn from_outcome(account_id: Uuid, outcome: RenewalOutcome) -> Self {
        match outcome {
            RenewalOutcome::Success(renewed) => Self {
                account_id,
                status: RefreshStatus::Renewed,
                reason: None,
                expires_at: Some(renewed.account.expires_at),
            },
            RenewalOutcome::Transient(reason) => Self {
                account_id,
                status: RefreshStatus::TransientFailure,
                reason: Some(reason),
                expires_at: None,
            },
            RenewalOutcome::PermanentInvalidation { reason, removed } => Self {
                account_id,
                status: if removed {
                    RefreshStatus::Removed
                } else {
                    RefreshStatus::Rejected
                },
                reason: Some(reason),
                expires_at: None,
            },
        }
    }
}

fn credential_manager(state: &AppState) -> CredentialManager<'_, PgRepo, MeliApi> {
    CredentialManager::new(
        &state.repo,
        &state.api,
        CredentialPolicy::from_config(&state.config),
    )
}

pub(super) async fn ensure_tokens(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<TokenSummary>>, ApiError> {
    let summary = run_detached(&state, &req_id.0, |state| async move {
        credential_manager(&state).ensure_all_active_valid().await
    })
    .await?;

    Ok(Json(ApiResponse::new(summary, req_id.0)))
}

pub(super) async fn force_refresh(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<ApiResponse<RefreshResult>>, ApiError> {
    let attempts = query.attempts.unwrap_or(DEFAULT_FORCE_ATTEMPTS);
    if !(1..=MAX_FORCE_ATTEMPTS).contains(&attempts) {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            format!("attempts must be between 1 and {MAX_FORCE_ATTEMPTS}"),
        ));
    }

    let outcome = run_detached(&state, &req_id.0, move |state| async move {
        credential_manager(&state)
            .force_refresh(account_id, attempts)
            .await
    })
    .await?;

    Ok(Json(ApiResponse::new(
        RefreshResult::from_outcome(account_id, outcome),
        req_id.0,
    )))
}
