//! HTTP client for the Mercado Livre REST API.

mod oauth;

use std::time::Duration;

use chrono::SecondsFormat;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use mktsync_core::AppConfig;

use crate::error::MeliError;
use crate::retry::retry_with_backoff;
use crate::types::{
    MeliShipment, OrderSearchQuery, OrdersPage, OrdersSearchResponse, RawOrder, RawShipment,
};

pub const DEFAULT_BASE_URL: &str = "https://api.mercadolibre.com/";

/// Page size accepted by `GET /orders/search`.
pub const PAGE_LIMIT: u32 = 50;

/// Upstream error messages are truncated to this many characters.
const MAX_MESSAGE_CHARS: usize = 300;

/// Client for the marketplace API.
///
/// Every request is retried on transient failures (429, 500/502/503/504,
/// network errors) with exponential back-off and jitter. 401/403 surface as
/// [`MeliError::Unauthorized`] and are never retried.
#[derive(Clone)]
pub struct MeliClient {
    client: Client,
    base_url: Url,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl MeliClient {
    /// Creates a client pointed at the production API.
    ///
    /// # Errors
    ///
    /// Returns [`MeliError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, MeliError> {
        Self::with_base_url(
            DEFAULT_BASE_URL,
            timeout_secs,
            user_agent,
            max_retries,
            backoff_base_ms,
        )
    }

    /// Creates a client with a custom base URL (wiremock in tests).
    ///
    /// # Errors
    ///
    /// Returns [`MeliError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`MeliError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        base_url: &str,
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, MeliError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;

        // A trailing slash keeps `Url::join` from replacing the last segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| MeliError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            max_retries,
            backoff_base_ms,
        })
    }

    /// Builds a client from the loaded application config.
    ///
    /// # Errors
    ///
    /// Same as [`MeliClient::with_base_url`].
    pub fn from_config(config: &AppConfig) -> Result<Self, MeliError> {
        Self::with_base_url(
            &config.meli_api_base_url,
            config.http_timeout_secs,
            &config.http_user_agent,
            config.http_max_retries,
            config.http_backoff_base_ms,
        )
    }

    /// Fetches one page of `GET /orders/search`, newest first.
    ///
    /// Results that fail to parse are counted in [`OrdersPage::malformed`]
    /// rather than failing the page.
    ///
    /// # Errors
    ///
    /// Any [`MeliError`] from the request after retries are exhausted.
    pub async fn search_orders(
        &self,
        access_token: &str,
        query: &OrderSearchQuery,
    ) -> Result<OrdersPage, MeliError> {
        let url = self.orders_search_url(query)?;
        let response: OrdersSearchResponse = self
            .get_json(access_token, url, &format!("orders search for seller {}", query.seller_id))
            .await?;

        let mut page = OrdersPage {
            orders: Vec::with_capacity(response.results.len()),
            malformed: 0,
            total: response.paging.total.unwrap_or(0),
        };
        for raw in response.results {
            match RawOrder::from_value(raw) {
                Ok(order) => page.orders.push(order),
                Err(e) => {
                    tracing::warn!(
                        seller_id = %query.seller_id,
                        offset = query.offset,
                        error = %e,
                        "skipping malformed order in search results"
                    );
                    page.malformed += 1;
                }
            }
        }
        Ok(page)
    }

    /// Fetches a single order by id (`GET /orders/{id}`).
    ///
    /// # Errors
    ///
    /// [`MeliError::NotFound`] for unknown ids; otherwise any request error.
    pub async fn get_order(&self, access_token: &str, order_id: &str) -> Result<RawOrder, MeliError> {
        let url = self.endpoint(&format!("orders/{order_id}"))?;
        let raw: serde_json::Value = self
            .get_json(access_token, url, &format!("order {order_id}"))
            .await?;
        RawOrder::from_value(raw).map_err(|source| MeliError::Deserialize {
            context: format!("order {order_id}"),
            source,
        })
    }

    /// Fetches shipment detail (`GET /shipments/{id}`).
    ///
    /// # Errors
    ///
    /// Any request or deserialization error.
    pub async fn get_shipment(
        &self,
        access_token: &str,
        shipment_id: &str,
    ) -> Result<RawShipment, MeliError> {
        let url = self.endpoint(&format!("shipments/{shipment_id}"))?;
        let context = format!("shipment {shipment_id}");
        let raw: serde_json::Value = self.get_json(access_token, url, &context).await?;
        let shipment = serde_json::from_value::<MeliShipment>(raw.clone())
            .map_err(|source| MeliError::Deserialize { context, source })?;
        Ok(RawShipment { raw, shipment })
    }

    fn endpoint(&self, path: &str) -> Result<Url, MeliError> {
        self.base_url
            .join(path)
            .map_err(|e| MeliError::InvalidBaseUrl {
                url: format!("{}{path}", self.base_url),
                reason: e.to_string(),
            })
    }

    fn orders_search_url(&self, query: &OrderSearchQuery) -> Result<Url, MeliError> {
        let mut url = self.endpoint("orders/search")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("seller", &query.seller_id)
                .append_pair("sort", "date_desc")
                .append_pair("limit", &query.limit.to_string())
                .append_pair("offset", &query.offset.to_string());
            if let Some(from) = query.from {
                pairs.append_pair(
                    "order.date_created.from",
                    &from.to_rfc3339_opts(SecondsFormat::Millis, true),
                );
            }
            if let Some(to) = query.to {
                pairs.append_pair(
                    "order.date_created.to",
                    &to.to_rfc3339_opts(SecondsFormat::Millis, true),
                );
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        url: Url,
        context: &str,
    ) -> Result<T, MeliError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            let request = self
                .client
                .get(url.clone())
                .bearer_auth(access_token)
                .header(reqwest::header::ACCEPT, "application/json");
            send_json(request, url.as_str(), context)
        })
        .await
    }
}

/// Sends `request` and maps the response into `T` or a typed error.
async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    url: &str,
    context: &str,
) -> Result<T, MeliError> {
    let response = request.send().await?;
    let response = check_status(response, url).await?;
    let body = response.text().await?;
    serde_json::from_str::<T>(&body).map_err(|source| MeliError::Deserialize {
        context: context.to_owned(),
        source,
    })
}

async fn check_status(response: Response, url: &str) -> Result<Response, MeliError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(MeliError::RateLimited { retry_after_secs });
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(MeliError::Unauthorized {
            status: status.as_u16(),
            url: url.to_owned(),
        });
    }

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(MeliError::NotFound {
            url: url.to_owned(),
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(MeliError::UnexpectedStatus {
        status: status.as_u16(),
        url: url.to_owned(),
        message: upstream_message(&body),
    })
}

/// Extracts `message` (or `error`) from a JSON error body, falling back to the
/// truncated raw body.
pub(crate) fn upstream_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let field = parsed.as_ref().and_then(|v| {
        v.get("message")
            .or_else(|| v.get("error"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
    });
    let message = field.unwrap_or_else(|| body.trim().to_owned());
    message.chars().take(MAX_MESSAGE_CHARS).collect()
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
