//! Dedup & Upsert layer: normalizes fetched payloads and writes them keyed by
//! `(account, order id)`.

use std::collections::{HashMap, HashSet};

use mktsync_core::{is_cancelled, is_paid, Account};
use mktsync_db::UpsertOutcome;
use mktsync_meli::{normalize_order, OrderPayload};
use serde::Serialize;

use crate::repo::OrderRepo;
use crate::SyncError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderFailure {
    pub order_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    /// Orders written (inserted or overwritten).
    pub saved: usize,
    /// Orders that did not exist before this batch.
    pub new_orders: usize,
    /// Orders that failed normalization or persistence.
    pub skipped: usize,
    /// Repeated order ids within the batch; the first occurrence is kept.
    pub duplicates: usize,
    /// Saved orders in a cancellation status.
    pub cancelled: usize,
    /// Saved orders in a paid or completed status.
    pub paid: usize,
    pub failures: Vec<OrderFailure>,
    /// Set when SKU unit costs could not be loaded; the batch was saved with
    /// net-revenue margins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_cost_error: Option<String>,
}

/// Normalizes and upserts `payloads` for `account`.
///
/// Per-order failures are logged and counted as skipped.
///
/// # Errors
///
/// Returns [`SyncError`] only for systemic storage failures (see
/// [`SyncError::is_systemic`]), which abort the batch.
pub async fn upsert_orders<R: OrderRepo>(
    repo: &R,
    account: &Account,
    payloads: Vec<OrderPayload>,
) -> Result<UpsertReport, SyncError> {
    let mut report = UpsertReport::default();

    let mut seen = HashSet::with_capacity(payloads.len());
    let mut normalized = Vec::with_capacity(payloads.len());
    for payload in payloads {
        let order_id = payload.order.order.id.clone();
        if !seen.insert(order_id.clone()) {
            report.duplicates += 1;
            continue;
        }
        match normalize_order(&payload) {
            Ok(order) => normalized.push(order),
            Err(e) => {
                tracing::warn!(account_id = %account.id, order_id = %order_id, error = %e, "order normalization failed");
                report.skip(order_id, e.to_string());
            }
        }
    }

    let mut skus: Vec<String> = normalized.iter().filter_map(|o| o.sku.clone()).collect();
    skus.sort_unstable();
    skus.dedup();
    let unit_costs = match repo.load_unit_costs(&account.owner_id, &skus).await {
        Ok(costs) => costs,
        Err(e) if e.is_systemic() => return Err(e),
        Err(e) => {
            tracing::warn!(account_id = %account.id, owner_id = %account.owner_id, error = %e, "unit cost lookup failed, saving net-revenue margins");
            report.unit_cost_error = Some(e.to_string());
            HashMap::new()
        }
    };

    for mut order in normalized {
        if let Some(sku) = order.sku.as_deref() {
            order.apply_unit_cost(unit_costs.get(sku).copied());
        }
        match repo.upsert_order(account.id, &order).await {
            Ok(outcome) => {
                report.saved += 1;
                if is_cancelled(&order.status) {
                    report.cancelled += 1;
                } else if is_paid(&order.status) {
                    report.paid += 1;
                }
                if outcome == UpsertOutcome::Inserted {
                    report.new_orders += 1;
                }
            }
            Err(e) if e.is_systemic() => return Err(e),
            Err(e) => {
                tracing::warn!(account_id = %account.id, order_id = %order.order_id, error = %e, "order upsert failed");
                report.skip(order.order_id, e.to_string());
            }
        }
    }

    tracing::debug!(
        account_id = %account.id,
        saved = report.saved,
        new_orders = report.new_orders,
        skipped = report.skipped,
        duplicates = report.duplicates,
        "order batch persisted"
    );
    Ok(report)
}

impl UpsertReport {
    fn skip(&mut self, order_id: String, reason: String) {
        self.skipped += 1;
        self.failures.push(OrderFailure { order_id, reason });
    }
}
