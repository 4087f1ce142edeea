mod accounts;
mod sync;
mod tokens;

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use mktsync_core::AppConfig;
use mktsync_sync::{MeliApi, PgRepo, SyncError};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimit, RequestId,
};

/// Shared by HTTP handlers and scheduled jobs.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub repo: PgRepo,
    pub api: MeliApi,
    pub config: Arc<AppConfig>,
    /// Held for the duration of any pass that renews credentials or writes
    /// orders, so two passes never rotate the same refresh token.
    pub sync_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// # Errors
    ///
    /// Returns an error if the marketplace client cannot be built.
    pub fn new(pool: PgPool, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let api = MeliApi::from_config(&config)?;
        Ok(Self {
            repo: PgRepo::new(pool.clone()),
            pool,
            api,
            config,
            sync_lock: Arc::new(Mutex::new(())),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "service_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_db_error(request_id: String, error: &mktsync_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

pub(super) fn map_sync_error(request_id: String, error: &SyncError) -> ApiError {
    match error {
        SyncError::AccountNotFound(id) => ApiError::new(
            request_id,
            "not_found",
            format!("account {id} not found or has no credential"),
        ),
        SyncError::PlatformUnsupported(platform) => ApiError::new(
            request_id,
            "validation_error",
            format!("no ingestion client for platform {platform}"),
        ),
        e if e.is_systemic() => {
            tracing::error!(error = %e, "sync aborted: storage unavailable");
            ApiError::new(request_id, "service_unavailable", "storage unavailable")
        }
        e => {
            tracing::error!(error = %e, "sync failed");
            ApiError::new(request_id, "internal_error", "sync failed")
        }
    }
}

pub(super) fn busy(request_id: String) -> ApiError {
    ApiError::new(
        request_id,
        "conflict",
        "another sync or token pass is running",
    )
}

/// Runs a credential or order pass on its own task while holding the sync
/// lock. The pass finishes even when the request is dropped, so a rotated
/// refresh token is always persisted.
pub(super) async fn run_detached<T, F, Fut>(
    state: &AppState,
    request_id: &str,
    work: F,
) -> Result<T, ApiError>
where
    F: FnOnce(AppState) -> Fut,
    Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    T: Send + 'static,
{
    let Ok(guard) = Arc::clone(&state.sync_lock).try_lock_owned() else {
        return Err(busy(request_id.to_string()));
    };

    let pass = work(state.clone());
    let task = tokio::spawn(async move {
        let result = pass.await;
        drop(guard);
        result
    });

    match task.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(map_sync_error(request_id.to_string(), &e)),
        Err(e) => {
            tracing::error!(error = %e, "detached pass panicked");
            Err(ApiError::new(request_id, "internal_error", "pass failed"))
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimit) -> Router<AppState> {
    Router::new()
        .route("/api/v1/sync", post(sync::run_sync))
        .route("/api/v1/sync/check", get(sync::check_new_orders))
        .route("/api/v1/tokens/ensure", post(tokens::ensure_tokens))
        .route("/api/v1/accounts", get(accounts::list_accounts))
        .route(
            "/api/v1/accounts/{account_id}/refresh",
            post(tokens::force_refresh),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimit) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match mktsync_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}
