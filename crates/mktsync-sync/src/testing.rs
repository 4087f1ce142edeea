//! In-memory fakes of the repositories and the marketplace API.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use mktsync_core::{Account, NormalizedOrder, Platform, TokenGrant};
use mktsync_db::{AccountFilter, DbError, UpsertOutcome};
use mktsync_meli::{
    MeliError, MeliShipment, OrderPayload, OrderSearchQuery, OrdersPage, RawOrder, RawShipment,
    TokenRejection,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::MarketplaceApi;
use crate::repo::{CredentialRepo, OrderRepo};
use crate::SyncError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Meli account whose token is valid for another 6 hours.
pub(crate) fn account(seller_id: &str) -> Account {
    Account {
        id: Uuid::new_v4(),
        owner_id: "owner-1".to_string(),
        platform: Platform::Meli,
        external_seller_id: seller_id.to_string(),
        nickname: Some(format!("LOJA_{seller_id}")),
        access_token: format!("access-{seller_id}"),
        refresh_token: format!("refresh-{seller_id}"),
        expires_at: Utc::now() + Duration::hours(6),
    }
}

pub(crate) fn expiring(mut account: Account) -> Account {
    account.expires_at = Utc::now() + Duration::minutes(1);
    account
}

pub(crate) fn order_json(id: &str, total: f64, quantity: u32) -> Value {
    json!({
        "id": id,
        "status": "paid",
        "date_created": "2026-10-01T10:00:00.000-03:00",
        "total_amount": total,
        "order_items": [{
            "item": { "id": "MLB1", "title": "Produto", "seller_sku": "SKU-1" },
            "quantity": quantity,
            "unit_price": total / f64::from(quantity)
        }],
        "buyer": { "nickname": "COMPRADOR" }
    })
}

pub(crate) fn order_at(id: &str, created: DateTime<Utc>) -> Value {
    let mut order = order_json(id, 100.0, 1);
    order["date_created"] = json!(created.to_rfc3339());
    order
}

pub(crate) fn order_payload(id: &str, total: f64, quantity: u32) -> OrderPayload {
    let raw = RawOrder::from_value(order_json(id, total, quantity)).unwrap();
    OrderPayload::from_order_only(raw)
}

pub(crate) fn shipment_payload(
    id: &str,
    total: f64,
    logistic_type: &str,
    base_cost: f64,
    list_cost: f64,
) -> OrderPayload {
    let order = RawOrder::from_value(order_json(id, total, 1)).unwrap();
    let raw = json!({
        "id": format!("S{id}"),
        "logistic_type": logistic_type,
        "base_cost": base_cost,
        "shipping_option": { "list_cost": list_cost }
    });
    let shipment: MeliShipment = serde_json::from_value(raw.clone()).unwrap();
    OrderPayload::with_shipment(order, RawShipment { raw, shipment })
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub(crate) struct FakeCredential {
    pub account: Account,
    pub active: bool,
    pub failure_count: u32,
    pub first_failure_at: Option<DateTime<Utc>>,
    pub last_failure_reason: Option<String>,
    pub invalid_since: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct StoreState {
    credentials: Vec<FakeCredential>,
    orders: HashMap<(Uuid, String), NormalizedOrder>,
    unit_costs: HashMap<(String, String), f64>,
    failing_upserts: HashSet<String>,
    failing_cost_owners: HashSet<String>,
    unreachable: bool,
}

#[derive(Default)]
pub(crate) struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub(crate) fn with_accounts(accounts: &[Account]) -> Self {
        let store = Self::default();
        for account in accounts {
            store.insert(account.clone());
        }
        store
    }

    pub(crate) fn insert(&self, account: Account) {
        lock(&self.state).credentials.push(FakeCredential {
            account,
            active: true,
            failure_count: 0,
            first_failure_at: None,
            last_failure_reason: None,
            invalid_since: None,
        });
    }

    pub(crate) fn credential(&self, id: Uuid) -> Option<FakeCredential> {
        lock(&self.state)
            .credentials
            .iter()
            .find(|c| c.account.id == id)
            .cloned()
    }

    pub(crate) fn update(&self, id: Uuid, f: impl FnOnce(&mut FakeCredential)) {
        let mut state = lock(&self.state);
        if let Some(cred) = state.credentials.iter_mut().find(|c| c.account.id == id) {
            f(cred);
        }
    }

    pub(crate) fn order(&self, account_id: Uuid, order_id: &str) -> Option<NormalizedOrder> {
        lock(&self.state)
            .orders
            .get(&(account_id, order_id.to_string()))
            .cloned()
    }

    pub(crate) fn order_count(&self, account_id: Uuid) -> usize {
        lock(&self.state)
            .orders
            .keys()
            .filter(|(id, _)| *id == account_id)
            .count()
    }

    pub(crate) fn set_unit_cost(&self, owner_id: &str, sku: &str, cost: f64) {
        lock(&self.state)
            .unit_costs
            .insert((owner_id.to_string(), sku.to_string()), cost);
    }

    pub(crate) fn fail_upsert_for(&self, order_id: &str) {
        lock(&self.state).failing_upserts.insert(order_id.to_string());
    }

    pub(crate) fn fail_unit_costs_for(&self, owner_id: &str) {
        lock(&self.state)
            .failing_cost_owners
            .insert(owner_id.to_string());
    }

    pub(crate) fn set_unreachable(&self) {
        lock(&self.state).unreachable = true;
    }
}

impl CredentialRepo for FakeStore {
    async fn list_active(&self, filter: &AccountFilter) -> Result<Vec<Account>, SyncError> {
        let state = lock(&self.state);
        Ok(state
            .credentials
            .iter()
            .filter(|c| c.active)
            .filter(|c| filter.platform.is_none_or(|p| p == c.account.platform))
            .filter(|c| {
                filter
                    .owner_id
                    .as_deref()
                    .is_none_or(|o| o == c.account.owner_id)
            })
            .filter(|c| filter.account_ids.is_empty() || filter.account_ids.contains(&c.account.id))
            .map(|c| c.account.clone())
            .collect())
    }

    async fn get(&self, account_id: Uuid) -> Result<Option<Account>, SyncError> {
        Ok(self.credential(account_id).map(|c| c.account))
    }

    async fn update_tokens(
        &self,
        account_id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        if self.credential(account_id).is_none() {
            return Err(SyncError::Db(DbError::NotFound));
        }
        self.update(account_id, |c| {
            c.account.access_token = access_token.to_string();
            c.account.refresh_token = refresh_token.to_string();
            c.account.expires_at = expires_at;
            c.failure_count = 0;
            c.first_failure_at = None;
            c.last_failure_reason = None;
            c.invalid_since = None;
        });
        Ok(())
    }

    async fn record_transient_failure(&self, account_id: Uuid, reason: &str) -> Result<(), SyncError> {
        self.update(account_id, |c| c.last_failure_reason = Some(reason.to_string()));
        Ok(())
    }

    async fn record_permanent_failure(
        &self,
        account_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
        window_start: DateTime<Utc>,
    ) -> Result<u32, SyncError> {
        let mut count = 0;
        self.update(account_id, |c| {
            if c.first_failure_at.is_none_or(|first| first < window_start) {
                c.failure_count = 1;
                c.first_failure_at = Some(now);
            } else {
                c.failure_count += 1;
            }
            c.last_failure_reason = Some(reason.to_string());
            count = c.failure_count;
        });
        Ok(count)
    }

    async fn mark_invalid(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<(), SyncError> {
        self.update(account_id, |c| {
            c.invalid_since.get_or_insert(now);
        });
        Ok(())
    }

    async fn is_marked_invalid(&self, account_id: Uuid) -> Result<bool, SyncError> {
        Ok(self
            .credential(account_id)
            .is_some_and(|c| c.invalid_since.is_some()))
    }

    async fn clear_failures(&self, account_id: Uuid) -> Result<(), SyncError> {
        self.update(account_id, |c| {
            c.failure_count = 0;
            c.first_failure_at = None;
            c.last_failure_reason = None;
            c.invalid_since = None;
        });
        Ok(())
    }

    async fn delete_credential(&self, account_id: Uuid) -> Result<bool, SyncError> {
        let mut state = lock(&self.state);
        let before = state.credentials.len();
        state.credentials.retain(|c| c.account.id != account_id);
        Ok(state.credentials.len() < before)
    }
}

impl OrderRepo for FakeStore {
    async fn known_order_ids(&self, account_id: Uuid) -> Result<HashSet<String>, SyncError> {
        Ok(lock(&self.state)
            .orders
            .keys()
            .filter(|(id, _)| *id == account_id)
            .map(|(_, order_id)| order_id.clone())
            .collect())
    }

    async fn upsert_order(
        &self,
        account_id: Uuid,
        order: &NormalizedOrder,
    ) -> Result<UpsertOutcome, SyncError> {
        let mut state = lock(&self.state);
        if state.unreachable {
            return Err(SyncError::Db(DbError::Sqlx(sqlx::Error::PoolTimedOut)));
        }
        if state.failing_upserts.contains(&order.order_id) {
            return Err(SyncError::Db(DbError::InvalidData(format!(
                "rejected order {}",
                order.order_id
            ))));
        }
        let previous = state
            .orders
            .insert((account_id, order.order_id.clone()), order.clone());
        Ok(if previous.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn load_unit_costs(
        &self,
        owner_id: &str,
        skus: &[String],
    ) -> Result<HashMap<String, f64>, SyncError> {
        let state = lock(&self.state);
        if state.failing_cost_owners.contains(owner_id) {
            return Err(SyncError::Db(DbError::InvalidData(
                "bad sku cost row".to_string(),
            )));
        }
        Ok(skus
            .iter()
            .filter_map(|sku| {
                state
                    .unit_costs
                    .get(&(owner_id.to_string(), sku.clone()))
                    .map(|cost| (sku.clone(), *cost))
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Marketplace API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshBehavior {
    Grant,
    Reject,
    ServerError,
}

#[derive(Default)]
struct ApiState {
    refresh: HashMap<String, RefreshBehavior>,
    refresh_calls: Vec<String>,
    grants_issued: u32,
    orders: HashMap<String, Vec<Value>>,
    search_failures: HashMap<String, u16>,
    shipments: HashMap<String, Value>,
    searches: Vec<OrderSearchQuery>,
    /// Refresh and search calls in the order they were made.
    calls: Vec<String>,
}

pub(crate) struct FakeApi {
    platform: Platform,
    state: Mutex<ApiState>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            platform: Platform::Meli,
            state: Mutex::default(),
        }
    }
}

impl FakeApi {
    pub(crate) fn on_refresh(&self, refresh_token: &str, behavior: RefreshBehavior) {
        lock(&self.state)
            .refresh
            .insert(refresh_token.to_string(), behavior);
    }

    pub(crate) fn refresh_calls(&self) -> Vec<String> {
        lock(&self.state).refresh_calls.clone()
    }

    pub(crate) fn set_orders(&self, seller_id: &str, orders: Vec<Value>) {
        lock(&self.state).orders.insert(seller_id.to_string(), orders);
    }

    pub(crate) fn fail_search(&self, seller_id: &str, status: u16) {
        lock(&self.state)
            .search_failures
            .insert(seller_id.to_string(), status);
    }

    pub(crate) fn set_shipment(&self, shipment_id: &str, shipment: Value) {
        lock(&self.state)
            .shipments
            .insert(shipment_id.to_string(), shipment);
    }

    pub(crate) fn searches(&self) -> Vec<OrderSearchQuery> {
        lock(&self.state).searches.clone()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }
}

fn created_at(order: &Value) -> Option<DateTime<Utc>> {
    order
        .get("date_created")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

impl MarketplaceApi for FakeApi {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn search_orders(
        &self,
        access_token: &str,
        query: &OrderSearchQuery,
    ) -> Result<OrdersPage, MeliError> {
        let mut state = lock(&self.state);
        state.searches.push(query.clone());
        state.calls.push(format!("search:{}", query.seller_id));

        if let Some(status) = state.search_failures.get(&query.seller_id) {
            return Err(match status {
                401 | 403 => MeliError::Unauthorized {
                    status: *status,
                    url: "orders/search".to_string(),
                },
                other => MeliError::UnexpectedStatus {
                    status: *other,
                    url: "orders/search".to_string(),
                    message: format!("fake status {other} for {access_token}"),
                },
            });
        }

        let matching: Vec<&Value> = state
            .orders
            .get(&query.seller_id)
            .map(|orders| {
                orders
                    .iter()
                    .filter(|o| match created_at(o) {
                        Some(created) => {
                            query.from.is_none_or(|from| created >= from)
                                && query.to.is_none_or(|to| created <= to)
                        }
                        None => true,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let start = (query.offset as usize).min(matching.len());
        let end = (start + query.limit as usize).min(matching.len());
        let mut page = OrdersPage {
            total: matching.len() as u64,
            ..OrdersPage::default()
        };
        for value in &matching[start..end] {
            match RawOrder::from_value((*value).clone()) {
                Ok(order) => page.orders.push(order),
                Err(_) => page.malformed += 1,
            }
        }
        Ok(page)
    }

    async fn get_order(&self, _access_token: &str, order_id: &str) -> Result<RawOrder, MeliError> {
        let state = lock(&self.state);
        let found = state
            .orders
            .values()
            .flatten()
            .find(|o| o.get("id").and_then(Value::as_str) == Some(order_id))
            .cloned();
        match found {
            Some(value) => RawOrder::from_value(value).map_err(|source| MeliError::Deserialize {
                context: format!("order {order_id}"),
                source,
            }),
            None => Err(MeliError::NotFound {
                url: format!("orders/{order_id}"),
            }),
        }
    }

    async fn get_shipment(
        &self,
        _access_token: &str,
        shipment_id: &str,
    ) -> Result<RawShipment, MeliError> {
        let raw = lock(&self.state).shipments.get(shipment_id).cloned();
        let Some(raw) = raw else {
            return Err(MeliError::NotFound {
                url: format!("shipments/{shipment_id}"),
            });
        };
        let shipment = serde_json::from_value(raw.clone()).map_err(|source| MeliError::Deserialize {
            context: format!("shipment {shipment_id}"),
            source,
        })?;
        Ok(RawShipment { raw, shipment })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, MeliError> {
        let mut state = lock(&self.state);
        state.refresh_calls.push(refresh_token.to_string());
        state.calls.push(format!("refresh:{refresh_token}"));
        let behavior = state
            .refresh
            .get(refresh_token)
            .copied()
            .unwrap_or(RefreshBehavior::Reject);
        match behavior {
            RefreshBehavior::Grant => {
                state.grants_issued += 1;
                let n = state.grants_issued;
                Ok(TokenGrant {
                    access_token: format!("access-new-{n}"),
                    refresh_token: Some(format!("refresh-new-{n}")),
                    expires_at: Utc::now() + Duration::hours(6),
                })
            }
            RefreshBehavior::Reject => Err(MeliError::TokenRejected(TokenRejection {
                status: 400,
                error: Some("invalid_grant".to_string()),
                message: Some("refresh token expired".to_string()),
            })),
            RefreshBehavior::ServerError => Err(MeliError::UnexpectedStatus {
                status: 503,
                url: "oauth/token".to_string(),
                message: "unavailable".to_string(),
            }),
        }
    }
}
