//! Postgres-backed repositories.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use mktsync_core::{Account, NormalizedOrder};
use mktsync_db::{AccountFilter, UpsertOutcome};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repo::{CredentialRepo, OrderRepo};
use crate::SyncError;

/// Both repositories over one connection pool.
#[derive(Debug, Clone)]
pub struct PgRepo {
    pool: PgPool,
}

impl PgRepo {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl CredentialRepo for PgRepo {
    async fn list_active(&self, filter: &AccountFilter) -> Result<Vec<Account>, SyncError> {
        let rows = mktsync_db::list_active_accounts(&self.pool, filter).await?;
        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match row.into_account() {
                Ok(account) => accounts.push(account),
                Err(e) => {
                    tracing::warn!(account_id = %id, error = %e, "skipping account with invalid stored data");
                }
            }
        }
        Ok(accounts)
    }

    async fn get(&self, account_id: Uuid) -> Result<Option<Account>, SyncError> {
        let row = mktsync_db::get_account_credential(&self.pool, account_id).await?;
        Ok(row.map(mktsync_db::AccountCredentialRow::into_account).transpose()?)
    }

    async fn update_tokens(
        &self,
        account_id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        mktsync_db::update_tokens(&self.pool, account_id, access_token, refresh_token, expires_at)
            .await?;
        Ok(())
    }

    async fn record_transient_failure(&self, account_id: Uuid, reason: &str) -> Result<(), SyncError> {
        mktsync_db::record_transient_failure(&self.pool, account_id, reason).await?;
        Ok(())
    }

    async fn record_permanent_failure(
        &self,
        account_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
        window_start: DateTime<Utc>,
    ) -> Result<u32, SyncError> {
        let count =
            mktsync_db::record_permanent_failure(&self.pool, account_id, reason, now, window_start)
                .await?;
        Ok(count)
    }

    async fn mark_invalid(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<(), SyncError> {
        mktsync_db::mark_account_invalid(&self.pool, account_id, now).await?;
        Ok(())
    }

    async fn is_marked_invalid(&self, account_id: Uuid) -> Result<bool, SyncError> {
        Ok(mktsync_db::is_account_marked_invalid(&self.pool, account_id).await?)
    }

    async fn clear_failures(&self, account_id: Uuid) -> Result<(), SyncError> {
        mktsync_db::clear_refresh_failures(&self.pool, account_id).await?;
        Ok(())
    }

    async fn delete_credential(&self, account_id: Uuid) -> Result<bool, SyncError> {
        Ok(mktsync_db::delete_credential(&self.pool, account_id).await?)
    }
}

impl OrderRepo for PgRepo {
    async fn known_order_ids(&self, account_id: Uuid) -> Result<HashSet<String>, SyncError> {
        let ids = mktsync_db::list_order_ids_for_account(&self.pool, account_id).await?;
        Ok(ids.into_iter().collect())
    }

    async fn upsert_order(
        &self,
        account_id: Uuid,
        order: &NormalizedOrder,
    ) -> Result<UpsertOutcome, SyncError> {
        Ok(mktsync_db::upsert_order(&self.pool, account_id, order).await?)
    }

    async fn load_unit_costs(
        &self,
        owner_id: &str,
        skus: &[String],
    ) -> Result<HashMap<String, f64>, SyncError> {
        Ok(mktsync_db::load_unit_costs(&self.pool, owner_id, skus).await?)
    }
}
