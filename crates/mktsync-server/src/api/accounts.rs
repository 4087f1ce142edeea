use axum::{
    extract::{Query, State},
    Extension, Json,
};
use mktsync_db::AccountStatusRow;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct AccountsQuery {
    pub owner_id: Option<String>,
}

pub(super) async fn list_accounts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<AccountsQuery>,
) -> Result<Json<ApiResponse<Vec<AccountStatusRow>>>, ApiError> {
    let rows = mktsync_db::list_account_statuses(&state.pool, query.owner_id.as_deref())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(rows, req_id.0)))
}
