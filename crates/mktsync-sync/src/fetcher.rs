//! Order Fetcher: walks `orders/search` for one account under the upstream
//! offset ceiling, splitting dense date windows, then attaches shipments.

use std::collections::VecDeque;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use mktsync_core::{Account, AppConfig};
use mktsync_meli::{MeliError, OrderPayload, OrderSearchQuery, OrdersPage, RawOrder, PAGE_LIMIT};
use serde::{Deserialize, Serialize};

use crate::api::MarketplaceApi;

/// Largest offset the search endpoint serves reliably.
pub const MAX_OFFSET: u32 = 9950;

/// Totals above this use the shorter sub-window.
const DENSE_TOTAL: u64 = 50_000;
const SPLIT_DAYS: i64 = 14;
const DENSE_SPLIT_DAYS: i64 = 7;
const MAX_SPLIT_DEPTH: u8 = 3;
/// Windows shorter than this are walked as-is.
const MIN_SPLIT_SPAN_MINUTES: i64 = 2;

/// Created-date range of a search. `None` bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateWindow {
    #[must_use]
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    /// `[now - hours, now]`.
    #[must_use]
    pub fn last_hours(now: DateTime<Utc>, hours: i64) -> Self {
        Self {
            from: Some(now - Duration::hours(hours)),
            to: Some(now),
        }
    }

    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.from.is_some() && self.to.is_some()
    }

    /// Closes open bounds with `[now - history_days, now]`.
    #[must_use]
    pub fn bounded(&self, now: DateTime<Utc>, history_days: i64) -> Self {
        Self {
            from: self.from.or(Some(now - Duration::days(history_days))),
            to: self.to.or(Some(now)),
        }
    }

    /// Consecutive, non-overlapping sub-windows of at most `chunk` each.
    /// Unbounded windows are returned unchanged.
    #[must_use]
    pub fn split(&self, chunk: Duration) -> Vec<DateWindow> {
        let (Some(from), Some(to)) = (self.from, self.to) else {
            return vec![*self];
        };
        if chunk <= Duration::zero() || to <= from {
            return vec![*self];
        }

        let step = Duration::milliseconds(1);
        let mut windows = Vec::new();
        let mut start = from;
        while start < to {
            let next = (start + chunk).min(to);
            let end = if next >= to { to } else { next - step };
            windows.push(DateWindow::new(Some(start), Some(end)));
            start = next;
        }
        windows
    }

    fn span(&self) -> Option<Duration> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Some(to - from),
            _ => None,
        }
    }
}

/// Page size and offset ceiling of the search endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub page_limit: u32,
    pub max_offset: u32,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            page_limit: PAGE_LIMIT,
            max_offset: MAX_OFFSET,
        }
    }
}

/// Orders collected for one account.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub orders: Vec<RawOrder>,
    /// Sum of server-reported totals over the walked windows.
    pub expected_total: u64,
    /// Results that could not be parsed.
    pub malformed: usize,
    /// At least one window still had results beyond the offset ceiling.
    pub hit_ceiling: bool,
    pub pages: u32,
}

pub struct OrderFetcher<'a, A> {
    api: &'a A,
    limits: FetchLimits,
    page_delay: StdDuration,
    history_days: i64,
}

impl<'a, A: MarketplaceApi> OrderFetcher<'a, A> {
    pub fn new(api: &'a A, limits: FetchLimits, page_delay: StdDuration, history_days: i64) -> Self {
        Self {
            api,
            limits,
            page_delay,
            history_days,
        }
    }

    pub fn from_config(api: &'a A, config: &AppConfig) -> Self {
        Self::new(
            api,
            FetchLimits::default(),
            StdDuration::from_millis(config.page_delay_ms),
            config.sync_history_days,
        )
    }

    /// Fetches every order of `account` created within `window`.
    ///
    /// Pages are requested one at a time in ascending offset order.
    ///
    /// # Errors
    ///
    /// Returns the first [`MeliError`] from the search endpoint (after the
    /// client's own retries).
    pub async fn fetch_orders(
        &self,
        account: &Account,
        window: DateWindow,
    ) -> Result<FetchResult, MeliError> {
        let mut result = FetchResult::default();
        let mut queue = VecDeque::from([(window, 0u8)]);

        while let Some((window, depth)) = queue.pop_front() {
            let first = self.page(account, &window, 0).await?;
            result.pages += 1;

            if first.total > u64::from(self.limits.max_offset) && depth < MAX_SPLIT_DEPTH {
                if !window.is_bounded() {
                    let bounded = window.bounded(Utc::now(), self.history_days);
                    tracing::debug!(
                        account_id = %account.id,
                        total = first.total,
                        history_days = self.history_days,
                        "bounding open window before splitting"
                    );
                    queue.push_front((bounded, depth));
                    continue;
                }
                let subs = split_chunk(&window, first.total)
                    .map(|chunk| window.split(chunk))
                    .unwrap_or_default();
                if subs.len() > 1 {
                    tracing::debug!(
                        account_id = %account.id,
                        total = first.total,
                        depth,
                        windows = subs.len(),
                        "window exceeds offset ceiling, splitting"
                    );
                    for sub in subs.into_iter().rev() {
                        queue.push_front((sub, depth + 1));
                    }
                    continue;
                }
            }

            self.walk(account, &window, first, &mut result).await?;
        }

        if result.hit_ceiling {
            tracing::warn!(
                account_id = %account.id,
                expected = result.expected_total,
                fetched = result.orders.len(),
                max_offset = self.limits.max_offset,
                "offset ceiling reached; some orders were not fetched"
            );
        }
        Ok(result)
    }

    /// Fetches specific orders by id. Orders that no longer exist or cannot be
    /// parsed are counted as malformed.
    ///
    /// # Errors
    ///
    /// Returns any other [`MeliError`] (authorization, network, server).
    pub async fn fetch_specific(
        &self,
        account: &Account,
        order_ids: &[String],
    ) -> Result<FetchResult, MeliError> {
        let mut result = FetchResult::default();
        for order_id in order_ids {
            match self.api.get_order(&account.access_token, order_id).await {
                Ok(order) => result.orders.push(order),
                Err(e @ (MeliError::NotFound { .. } | MeliError::Deserialize { .. })) => {
                    tracing::warn!(account_id = %account.id, order_id = %order_id, error = %e, "skipping order");
                    result.malformed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        result.expected_total = u64::try_from(order_ids.len()).unwrap_or(u64::MAX);
        Ok(result)
    }

    /// Pairs each order with its shipment detail, falling back to the order's
    /// embedded shipping object when the detail is unavailable.
    pub async fn attach_shipments(&self, account: &Account, orders: Vec<RawOrder>) -> Vec<OrderPayload> {
        let mut payloads = Vec::with_capacity(orders.len());
        for order in orders {
            let shipment_id = order.order.shipping.as_ref().and_then(|s| s.id.clone());
            let Some(shipment_id) = shipment_id else {
                payloads.push(OrderPayload::from_order_only(order));
                continue;
            };
            match self.api.get_shipment(&account.access_token, &shipment_id).await {
                Ok(shipment) => payloads.push(OrderPayload::with_shipment(order, shipment)),
                Err(e) => {
                    tracing::warn!(
                        account_id = %account.id,
                        order_id = %order.order.id,
                        shipment_id = %shipment_id,
                        error = %e,
                        "shipment detail unavailable, using order shipping data"
                    );
                    payloads.push(OrderPayload::from_order_only(order));
                }
            }
        }
        payloads
    }

    async fn walk(
        &self,
        account: &Account,
        window: &DateWindow,
        first: OrdersPage,
        result: &mut FetchResult,
    ) -> Result<(), MeliError> {
        let limit = self.limits.page_limit;
        let mut total = first.total;
        let mut page = first;
        let mut offset = 0u32;

        loop {
            let returned = page.orders.len() + page.malformed;
            result.malformed += page.malformed;
            result.orders.extend(page.orders);
            if returned == 0 {
                break;
            }

            offset = offset.saturating_add(limit);
            if total != 0 && u64::from(offset) >= total {
                break;
            }
            if offset >= self.limits.max_offset {
                result.hit_ceiling = true;
                break;
            }

            tokio::time::sleep(self.page_delay).await;
            page = self.page(account, window, offset).await?;
            result.pages += 1;
            total = total.max(page.total);
        }

        result.expected_total += total;
        Ok(())
    }

    async fn page(
        &self,
        account: &Account,
        window: &DateWindow,
        offset: u32,
    ) -> Result<OrdersPage, MeliError> {
        let query = OrderSearchQuery {
            seller_id: account.external_seller_id.clone(),
            offset,
            limit: self.limits.page_limit,
            from: window.from,
            to: window.to,
        };
        self.api.search_orders(&account.access_token, &query).await
    }
}

/// Sub-window length for a window reporting `total` results. Halves the
/// window once it is already shorter than the standard chunk; `None` when it
/// is too short to split.
fn split_chunk(window: &DateWindow, total: u64) -> Option<Duration> {
    let standard = if total > DENSE_TOTAL {
        Duration::days(DENSE_SPLIT_DAYS)
    } else {
        Duration::days(SPLIT_DAYS)
    };
    match window.span() {
        Some(span) if span <= Duration::minutes(MIN_SPLIT_SPAN_MINUTES) => None,
        Some(span) if span <= standard => Some(span / 2),
        _ => Some(standard),
    }
}

#[cfg(test)]
#[path = "fetcher_test.rs"]
mod tests;
