use thiserror::Error;

use crate::types::TokenRejection;

#[derive(Debug, Error)]
pub enum MeliError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by marketplace API (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("access denied ({status}) for {url}")]
    Unauthorized { status: u16, url: String },

    #[error("resource not found: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} from {url}: {message}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        message: String,
    },

    #[error("token refresh rejected: {0}")]
    TokenRejected(TokenRejection),

    #[error("normalization error for order {order_id}: {reason}")]
    Normalization { order_id: String, reason: String },

    #[error("invalid API base URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl MeliError {
    /// Upstream HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            MeliError::Http(e) => e.status().map(|s| s.as_u16()),
            MeliError::RateLimited { .. } => Some(429),
            MeliError::Unauthorized { status, .. } | MeliError::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            MeliError::NotFound { .. } => Some(404),
            MeliError::TokenRejected(rejection) => Some(rejection.status),
            MeliError::Deserialize { .. }
            | MeliError::Normalization { .. }
            | MeliError::InvalidBaseUrl { .. } => None,
        }
    }

    /// `true` for conditions worth retrying: rate limiting, gateway/server
    /// errors and network failures.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            MeliError::Http(_) | MeliError::RateLimited { .. } => true,
            MeliError::UnexpectedStatus { status, .. } => {
                matches!(status, 500 | 502 | 503 | 504)
            }
            MeliError::Deserialize { .. }
            | MeliError::Unauthorized { .. }
            | MeliError::NotFound { .. }
            | MeliError::TokenRejected(_)
            | MeliError::Normalization { .. }
            | MeliError::InvalidBaseUrl { .. } => false,
        }
    }
}
