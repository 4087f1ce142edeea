use chrono::{Duration, Utc};

use mktsync_core::TokenGrant;

use super::{check_status, upstream_message, MeliClient};
use crate::error::MeliError;
use crate::retry::retry_with_backoff;
use crate::types::{TokenRejection, TokenResponse};

/// Lifetime assumed when the token response omits `expires_in` (6 hours).
const DEFAULT_EXPIRES_IN_SECS: i64 = 21_600;

impl MeliClient {
    /// Exchanges a refresh token for a new access token
    /// (`POST /oauth/token`, `grant_type=refresh_token`).
    ///
    /// The returned grant carries the rotated refresh token when upstream sent
    /// one.
    ///
    /// # Errors
    ///
    /// - [`MeliError::TokenRejected`] for 400/401/403 responses, with the
    ///   OAuth `error` code and message parsed from the body.
    /// - [`MeliError::RateLimited`] / [`MeliError::UnexpectedStatus`] for 429
    ///   and other statuses (5xx retried first).
    /// - [`MeliError::Http`] on network failure after retries.
    #[tracing::instrument(skip(self, client_secret, refresh_token))]
    pub async fn refresh_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenGrant, MeliError> {
        let url = self.endpoint("oauth/token")?;
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
        ];

        let response: TokenResponse =
            retry_with_backoff(self.max_retries, self.backoff_base_ms, || async {
                let response = self
                    .client
                    .post(url.clone())
                    .header(reqwest::header::ACCEPT, "application/json")
                    .form(&form)
                    .send()
                    .await?;

                let status = response.status().as_u16();
                if matches!(status, 400 | 401 | 403) {
                    let body = response.text().await.unwrap_or_default();
                    return Err(MeliError::TokenRejected(parse_rejection(status, &body)));
                }

                let response = check_status(response, url.as_str()).await?;
                let body = response.text().await?;
                serde_json::from_str::<TokenResponse>(&body).map_err(|source| {
                    MeliError::Deserialize {
                        context: "token refresh response".to_owned(),
                        source,
                    }
                })
            })
            .await?;

        let expires_in = response
            .expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        Ok(TokenGrant {
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        })
    }
}

fn parse_rejection(status: u16, body: &str) -> TokenRejection {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => TokenRejection {
            status,
            error: value
                .get("error")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned),
            message: value
                .get("message")
                .or_else(|| value.get("error_description"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned),
        },
        Err(_) => TokenRejection {
            status,
            error: None,
            message: Some(upstream_message(body)).filter(|m| !m.is_empty()),
        },
    }
}
