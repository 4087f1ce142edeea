//! Request ids, bearer auth and a fixed-window limit for the trigger routes.
//! Rejections use the same error envelope as the handlers.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, RETRY_AFTER},
        HeaderMap, HeaderName, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::ApiError;

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Longer caller-supplied ids are replaced so they stay usable as log fields.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Request id stored as a request extension and echoed in every envelope.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn incoming_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map(ToOwned::to_owned)
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = incoming_request_id(req.headers()).unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(X_REQUEST_ID, value);
    }
    res
}

/// Bearer keys accepted by the trigger routes. An empty key set disables auth.
#[derive(Clone)]
pub struct AuthState {
    keys: Arc<[String]>,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl AuthState {
    /// Reads `MKTSYNC_API_KEYS` (comma-separated).
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("MKTSYNC_API_KEYS").unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    /// Missing keys are only tolerated in development.
    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let keys: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if keys.is_empty() {
            if !is_development {
                anyhow::bail!("MKTSYNC_API_KEYS is required outside development");
            }
            tracing::warn!("MKTSYNC_API_KEYS not set; trigger routes are unauthenticated");
        }

        Ok(Self { keys: keys.into() })
    }

    pub fn enabled(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Compares against every key without short-circuiting.
    fn allows(&self, token: &str) -> bool {
        self.keys.iter().fold(false, |matched, key| {
            matched | bool::from(key.as_bytes().ct_eq(token.as_bytes()))
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|token| !token.trim().is_empty())
}

pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled() || bearer_token(req.headers()).is_some_and(|token| auth.allows(token)) {
        return next.run(req).await;
    }

    ApiError::new(
        request_id_of(&req),
        "unauthorized",
        "missing or invalid bearer token",
    )
    .into_response()
}

/// Caps how many trigger requests are admitted per window, across all callers.
#[derive(Debug, Clone)]
pub struct RateLimit {
    max_requests: u32,
    window: Duration,
    current: Arc<Mutex<(Instant, u32)>>,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(120, Duration::from_secs(60))
    }
}

impl RateLimit {
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            current: Arc::new(Mutex::new((Instant::now(), 0))),
        }
    }

    /// Counts one request, or returns how long until the window resets.
    async fn admit(&self) -> Result<(), Duration> {
        let mut current = self.current.lock().await;
        let (started_at, count) = &mut *current;
        if started_at.elapsed() >= self.window {
            *started_at = Instant::now();
            *count = 0;
        }
        if *count >= self.max_requests {
            return Err(self.window.saturating_sub(started_at.elapsed()));
        }
        *count += 1;
        Ok(())
    }
}

pub async fn enforce_rate_limit(
    State(limit): State<RateLimit>,
    req: Request,
    next: Next,
) -> Response {
    match limit.admit().await {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            let mut res =
                ApiError::new(request_id_of(&req), "rate_limited", "too many requests")
                    .into_response();
            res.headers_mut().insert(
                RETRY_AFTER,
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
            res
        }
    }
}
