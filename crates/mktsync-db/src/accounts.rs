//! Database operations for `accounts` and `account_credentials`.

use chrono::{DateTime, Utc};
use mktsync_core::{Account, Platform};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// An account joined with its credential row.
#[derive(Clone, sqlx::FromRow)]
pub struct AccountCredentialRow {
    pub id: Uuid,
    pub owner_id: String,
    pub platform: String,
    pub external_seller_id: String,
    pub nickname: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_failure_count: i32,
    pub first_failure_at: Option<DateTime<Utc>>,
    pub last_failure_reason: Option<String>,
    pub invalid_since: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AccountCredentialRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentialRow")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("platform", &self.platform)
            .field("external_seller_id", &self.external_seller_id)
            .field("nickname", &self.nickname)
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .field("refresh_failure_count", &self.refresh_failure_count)
            .field("first_failure_at", &self.first_failure_at)
            .field("last_failure_reason", &self.last_failure_reason)
            .field("invalid_since", &self.invalid_since)
            .finish()
    }
}

impl AccountCredentialRow {
    /// Converts the row into the domain [`Account`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidData`] if the stored platform is unknown.
    pub fn into_account(self) -> Result<Account, DbError> {
        let platform = self
            .platform
            .parse::<Platform>()
            .map_err(|e| DbError::InvalidData(e.to_string()))?;
        Ok(Account {
            id: self.id,
            owner_id: self.owner_id,
            platform,
            external_seller_id: self.external_seller_id,
            nickname: self.nickname,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at,
        })
    }
}

/// Account listing row: no tokens, credential status only.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct AccountStatusRow {
    pub id: Uuid,
    pub owner_id: String,
    pub platform: String,
    pub external_seller_id: String,
    pub nickname: Option<String>,
    pub is_active: bool,
    pub has_credential: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_failure_count: Option<i32>,
    pub last_failure_reason: Option<String>,
    pub invalid_since: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Selection of accounts for a sync or maintenance pass.
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub platform: Option<Platform>,
    pub owner_id: Option<String>,
    /// Empty means "all".
    pub account_ids: Vec<Uuid>,
}

const CREDENTIAL_COLUMNS: &str = "a.id, a.owner_id, a.platform, a.external_seller_id, a.nickname, \
     c.access_token, c.refresh_token, c.expires_at, c.refresh_failure_count, \
     c.first_failure_at, c.last_failure_reason, c.invalid_since";

// ---------------------------------------------------------------------------
// accounts
// ---------------------------------------------------------------------------

/// Creates an account, or reactivates the existing one for the same
/// `(platform, external_seller_id, owner_id)`. Returns its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn insert_account(
    pool: &PgPool,
    owner_id: &str,
    platform: Platform,
    external_seller_id: &str,
    nickname: Option<&str>,
) -> Result<Uuid, DbError> {
    let id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO accounts (owner_id, platform, external_seller_id, nickname) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (platform, external_seller_id, owner_id) DO UPDATE SET \
             nickname = COALESCE(EXCLUDED.nickname, accounts.nickname), \
             is_active = TRUE, \
             updated_at = NOW() \
         RETURNING id",
    )
    .bind(owner_id)
    .bind(platform.as_str())
    .bind(external_seller_id)
    .bind(nickname)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Lists every account with its credential status, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_account_statuses(
    pool: &PgPool,
    owner_id: Option<&str>,
) -> Result<Vec<AccountStatusRow>, DbError> {
    let rows = sqlx::query_as::<_, AccountStatusRow>(
        "SELECT a.id, a.owner_id, a.platform, a.external_seller_id, a.nickname, a.is_active, \
                (c.account_id IS NOT NULL) AS has_credential, c.expires_at, \
                c.refresh_failure_count, c.last_failure_reason, c.invalid_since, a.created_at \
         FROM accounts a \
         LEFT JOIN account_credentials c ON c.account_id = a.id \
         WHERE ($1::text IS NULL OR a.owner_id = $1) \
         ORDER BY a.created_at DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Active accounts that still hold a credential, matching `filter`, in
/// creation order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_active_accounts(
    pool: &PgPool,
    filter: &AccountFilter,
) -> Result<Vec<AccountCredentialRow>, DbError> {
    let sql = format!(
        "SELECT {CREDENTIAL_COLUMNS} \
         FROM accounts a \
         JOIN account_credentials c ON c.account_id = a.id \
         WHERE a.is_active = TRUE \
           AND ($1::text IS NULL OR a.platform = $1) \
           AND ($2::text IS NULL OR a.owner_id = $2) \
           AND (cardinality($3::uuid[]) = 0 OR a.id = ANY($3)) \
         ORDER BY a.created_at, a.id"
    );
    let rows = sqlx::query_as::<_, AccountCredentialRow>(&sql)
        .bind(filter.platform.map(Platform::as_str))
        .bind(filter.owner_id.as_deref())
        .bind(&filter.account_ids)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Fetches one account with its credential; `None` when either is missing.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_account_credential(
    pool: &PgPool,
    account_id: Uuid,
) -> Result<Option<AccountCredentialRow>, DbError> {
    let sql = format!(
        "SELECT {CREDENTIAL_COLUMNS} \
         FROM accounts a \
         JOIN account_credentials c ON c.account_id = a.id \
         WHERE a.id = $1"
    );
    let row = sqlx::query_as::<_, AccountCredentialRow>(&sql)
        .bind(account_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

// ---------------------------------------------------------------------------
// account_credentials
// ---------------------------------------------------------------------------

/// Stores a fresh credential for an account (OAuth connect), replacing any
/// previous one and clearing failure state.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn upsert_credential(
    pool: &PgPool,
    account_id: Uuid,
    access_token: &str,
    refresh_token: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO account_credentials (account_id, access_token, refresh_token, expires_at) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (account_id) DO UPDATE SET \
             access_token = EXCLUDED.access_token, \
             refresh_token = EXCLUDED.refresh_token, \
             expires_at = EXCLUDED.expires_at, \
             refresh_failure_count = 0, \
             first_failure_at = NULL, \
             last_failure_at = NULL, \
             last_failure_reason = NULL, \
             invalid_since = NULL, \
             updated_at = NOW()",
    )
    .bind(account_id)
    .bind(access_token)
    .bind(refresh_token)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Writes renewed tokens and clears the failure counter and invalid flag.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the account has no credential row.
pub async fn update_tokens(
    pool: &PgPool,
    account_id: Uuid,
    access_token: &str,
    refresh_token: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE account_credentials SET \
             access_token = $2, \
             refresh_token = $3, \
             expires_at = $4, \
             refresh_failure_count = 0, \
             first_failure_at = NULL, \
             last_failure_reason = NULL, \
             invalid_since = NULL, \
             updated_at = NOW() \
         WHERE account_id = $1",
    )
    .bind(account_id)
    .bind(access_token)
    .bind(refresh_token)
    .bind(expires_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Clears the failure counter and invalid flag without touching tokens.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn clear_refresh_failures(pool: &PgPool, account_id: Uuid) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE account_credentials SET \
             refresh_failure_count = 0, first_failure_at = NULL, \
             last_failure_reason = NULL, invalid_since = NULL, updated_at = NOW() \
         WHERE account_id = $1",
    )
    .bind(account_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Records a transient refresh failure. Does not touch the counter.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn record_transient_failure(
    pool: &PgPool,
    account_id: Uuid,
    reason: &str,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE account_credentials SET \
             last_failure_reason = $2, last_failure_at = NOW(), updated_at = NOW() \
         WHERE account_id = $1",
    )
    .bind(account_id)
    .bind(reason)
    .execute(pool)
    .await?;

    Ok(())
}

/// Counts a permanent refresh failure and returns the new consecutive count.
///
/// The counter restarts at 1 when the first counted failure happened before
/// `window_start`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the account has no credential row.
pub async fn record_permanent_failure(
    pool: &PgPool,
    account_id: Uuid,
    reason: &str,
    now: DateTime<Utc>,
    window_start: DateTime<Utc>,
) -> Result<u32, DbError> {
    let count = sqlx::query_scalar::<_, i32>(
        "UPDATE account_credentials SET \
             refresh_failure_count = CASE \
                 WHEN first_failure_at IS NULL OR first_failure_at < $4 THEN 1 \
                 ELSE refresh_failure_count + 1 END, \
             first_failure_at = CASE \
                 WHEN first_failure_at IS NULL OR first_failure_at < $4 THEN $3 \
                 ELSE first_failure_at END, \
             last_failure_reason = $2, \
             last_failure_at = $3, \
             updated_at = NOW() \
         WHERE account_id = $1 \
         RETURNING refresh_failure_count",
    )
    .bind(account_id)
    .bind(reason)
    .bind(now)
    .bind(window_start)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(u32::try_from(count).unwrap_or(0))
}

/// Flags the account's credential invalid (keeps an existing flag's timestamp).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn mark_account_invalid(
    pool: &PgPool,
    account_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE account_credentials SET \
             invalid_since = COALESCE(invalid_since, $2), updated_at = NOW() \
         WHERE account_id = $1",
    )
    .bind(account_id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// `true` when the credential is flagged invalid. A missing row counts as not
/// flagged.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn is_account_marked_invalid(pool: &PgPool, account_id: Uuid) -> Result<bool, DbError> {
    let flagged = sqlx::query_scalar::<_, bool>(
        "SELECT invalid_since IS NOT NULL FROM account_credentials WHERE account_id = $1",
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?;

    Ok(flagged.unwrap_or(false))
}

/// Removes the credential row; the owner must reconnect. Returns whether a row
/// was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn delete_credential(pool: &PgPool, account_id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM account_credentials WHERE account_id = $1")
        .bind(account_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
