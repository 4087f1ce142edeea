//! Storage seams used by the sync pipeline.
//!
//! The Postgres implementations live in [`crate::pg`]; tests substitute
//! in-memory fakes.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use chrono::{DateTime, Utc};
use mktsync_core::{Account, NormalizedOrder};
use mktsync_db::{AccountFilter, UpsertOutcome};
use uuid::Uuid;

use crate::SyncError;

/// Credential store: one credential per connected seller account.
pub trait CredentialRepo: Send + Sync {
    /// Active accounts that hold a credential, matching `filter`.
    fn list_active(
        &self,
        filter: &AccountFilter,
    ) -> impl Future<Output = Result<Vec<Account>, SyncError>> + Send;

    /// Current stored credential for one account.
    fn get(&self, account_id: Uuid) -> impl Future<Output = Result<Option<Account>, SyncError>> + Send;

    /// Persists renewed tokens and clears failure state.
    fn update_tokens(
        &self,
        account_id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn record_transient_failure(
        &self,
        account_id: Uuid,
        reason: &str,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Counts a permanent failure; returns the consecutive count within the
    /// window that starts at `window_start`.
    fn record_permanent_failure(
        &self,
        account_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
        window_start: DateTime<Utc>,
    ) -> impl Future<Output = Result<u32, SyncError>> + Send;

    fn mark_invalid(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn is_marked_invalid(&self, account_id: Uuid)
        -> impl Future<Output = Result<bool, SyncError>> + Send;

    fn clear_failures(&self, account_id: Uuid) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Removes the credential; returns whether one existed.
    fn delete_credential(&self, account_id: Uuid)
        -> impl Future<Output = Result<bool, SyncError>> + Send;
}

/// Order store keyed by `(account, order id)`.
pub trait OrderRepo: Send + Sync {
    fn known_order_ids(
        &self,
        account_id: Uuid,
    ) -> impl Future<Output = Result<HashSet<String>, SyncError>> + Send;

    fn upsert_order(
        &self,
        account_id: Uuid,
        order: &NormalizedOrder,
    ) -> impl Future<Output = Result<UpsertOutcome, SyncError>> + Send;

    /// Known unit costs for `skus`; missing SKUs are absent from the map.
    fn load_unit_costs(
        &self,
        owner_id: &str,
        skus: &[String],
    ) -> impl Future<Output = Result<HashMap<String, f64>, SyncError>> + Send;
}
