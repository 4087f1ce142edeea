//! Credential Manager: keeps access tokens valid and decides when a credential
//! is beyond recovery.
//!
//! Refresh failures are classified on the typed client error. Transient
//! failures are recorded and retried on the next run. Permanent failures go
//! through a hysteresis policy: they are counted within a time window, the
//! account is flagged invalid once the count reaches the threshold, and only
//! a further permanent failure while flagged removes the credential.

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use mktsync_core::{Account, AppConfig, TokenGrant};
use mktsync_db::AccountFilter;
use mktsync_meli::{backoff_delay_ms, MeliError};
use serde::Serialize;
use uuid::Uuid;

use crate::api::MarketplaceApi;
use crate::repo::CredentialRepo;
use crate::SyncError;

/// Attempts used by [`CredentialManager::force_refresh`] when the caller does
/// not choose.
pub const DEFAULT_FORCE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct CredentialPolicy {
    /// Tokens expiring within this margin are renewed.
    pub refresh_margin: Duration,
    /// Consecutive permanent failures that flag an account invalid.
    pub invalidation_threshold: u32,
    pub invalidation_window: Duration,
    /// Base delay between forced-refresh attempts.
    pub backoff_base_ms: u64,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::minutes(10),
            invalidation_threshold: 3,
            invalidation_window: Duration::hours(24),
            backoff_base_ms: 1000,
        }
    }
}

impl CredentialPolicy {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            refresh_margin: Duration::seconds(config.token_refresh_margin_secs),
            invalidation_threshold: config.invalidation_threshold.max(1),
            invalidation_window: Duration::hours(config.invalidation_window_hours),
            backoff_base_ms: config.http_backoff_base_ms,
        }
    }
}

/// An account holding a usable access token.
#[derive(Debug, Clone)]
pub struct RenewedAccount {
    pub account: Account,
    /// `false` when the stored token was still valid and no call was made.
    pub refreshed: bool,
    /// Obtained through the secondary recovery path.
    pub recovered: bool,
}

#[derive(Debug, Clone)]
pub enum RenewalOutcome {
    Success(RenewedAccount),
    /// Network, rate-limit or server trouble; the account stays usable.
    Transient(String),
    /// The refresh token was rejected. `removed` is `true` once the
    /// credential has been deleted and the owner must reconnect.
    PermanentInvalidation { reason: String, removed: bool },
}

impl RenewalOutcome {
    #[must_use]
    pub fn renewed(&self) -> Option<&RenewedAccount> {
        match self {
            RenewalOutcome::Success(renewed) => Some(renewed),
            _ => None,
        }
    }

    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            RenewalOutcome::Success(_) => None,
            RenewalOutcome::Transient(reason)
            | RenewalOutcome::PermanentInvalidation { reason, .. } => Some(reason),
        }
    }
}

/// Classification of a failed refresh call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    Transient(String),
    Permanent(String),
}

/// Classifies a token-endpoint error.
///
/// Rejections (400/401/403, OAuth `invalid_grant` and friends) are permanent.
/// Rate limiting, 5xx, network errors and malformed bodies are transient.
#[must_use]
pub fn classify(err: &MeliError) -> RefreshFailure {
    match err {
        MeliError::TokenRejected(rejection) => RefreshFailure::Permanent(rejection.to_string()),
        MeliError::Unauthorized { status, .. } => {
            RefreshFailure::Permanent(format!("HTTP {status} from token endpoint"))
        }
        other => RefreshFailure::Transient(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Refreshed,
    StillValid,
    Recovered,
    Failed,
    Invalidated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenAccountStatus {
    pub account_id: Uuid,
    pub seller_id: String,
    pub label: String,
    pub status: TokenStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of a token maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenSummary {
    pub checked: usize,
    pub refreshed: usize,
    pub still_valid: usize,
    pub recovered: usize,
    /// Every account left without a usable token, invalidated ones included.
    pub failed: usize,
    pub invalidated: usize,
    pub accounts: Vec<TokenAccountStatus>,
}

impl TokenSummary {
    pub fn record(&mut self, account: &Account, outcome: &RenewalOutcome) {
        self.checked += 1;
        let (status, reason) = match outcome {
            RenewalOutcome::Success(r) if r.recovered => (TokenStatus::Recovered, None),
            RenewalOutcome::Success(r) if r.refreshed => (TokenStatus::Refreshed, None),
            RenewalOutcome::Success(_) => (TokenStatus::StillValid, None),
            RenewalOutcome::Transient(reason)
            | RenewalOutcome::PermanentInvalidation {
                reason,
                removed: false,
            } => (TokenStatus::Failed, Some(reason.clone())),
            RenewalOutcome::PermanentInvalidation {
                reason,
                removed: true,
            } => (TokenStatus::Invalidated, Some(reason.clone())),
        };
        match status {
            TokenStatus::Refreshed => self.refreshed += 1,
            TokenStatus::StillValid => self.still_valid += 1,
            TokenStatus::Recovered => self.recovered += 1,
            TokenStatus::Failed => self.failed += 1,
            TokenStatus::Invalidated => {
                self.failed += 1;
                self.invalidated += 1;
            }
        }
        self.accounts.push(TokenAccountStatus {
            account_id: account.id,
            seller_id: account.external_seller_id.clone(),
            label: account.label(),
            status,
            reason,
        });
    }
}

pub struct CredentialManager<'a, R, A> {
    repo: &'a R,
    api: &'a A,
    policy: CredentialPolicy,
}

impl<'a, R: CredentialRepo, A: MarketplaceApi> CredentialManager<'a, R, A> {
    pub fn new(repo: &'a R, api: &'a A, policy: CredentialPolicy) -> Self {
        Self { repo, api, policy }
    }

    /// Returns a usable credential for `account`, refreshing it when it
    /// expires within the safety margin.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] only when the credential store itself fails.
    /// Refresh failures are reported through [`RenewalOutcome`].
    pub async fn renew(&self, account: &Account) -> Result<RenewalOutcome, SyncError> {
        if !account.expires_within(Utc::now(), self.policy.refresh_margin) {
            return Ok(RenewalOutcome::Success(RenewedAccount {
                account: account.clone(),
                refreshed: false,
                recovered: false,
            }));
        }
        self.refresh(account).await
    }

    /// Refreshes unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the credential store fails.
    pub async fn refresh(&self, account: &Account) -> Result<RenewalOutcome, SyncError> {
        match self.api.refresh_token(&account.refresh_token).await {
            Ok(grant) => Ok(RenewalOutcome::Success(self.store_grant(account, grant, false).await?)),
            Err(err) => self.handle_failure(account, classify(&err)).await,
        }
    }

    /// Active accounts matching `filter` on this manager's platform.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the account list cannot be read.
    pub async fn eligible_accounts(&self, filter: &AccountFilter) -> Result<Vec<Account>, SyncError> {
        let filter = AccountFilter {
            platform: Some(self.api.platform()),
            ..filter.clone()
        };
        self.repo.list_active(&filter).await
    }

    /// [`CredentialManager::renew`] with row-level store failures folded into
    /// a transient outcome for that account.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] only for systemic store failures.
    pub async fn renew_contained(&self, account: &Account) -> Result<RenewalOutcome, SyncError> {
        match self.renew(account).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_systemic() => Err(e),
            Err(e) => {
                tracing::error!(account_id = %account.id, error = %e, "credential store failure during renewal");
                Ok(RenewalOutcome::Transient(e.to_string()))
            }
        }
    }

    /// Renews every active account matching `filter` on this manager's
    /// platform.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the account list cannot be read or the store
    /// fails systemically. Failures of individual accounts are recorded in
    /// their outcome.
    pub async fn renew_all(
        &self,
        filter: &AccountFilter,
    ) -> Result<Vec<(Account, RenewalOutcome)>, SyncError> {
        let accounts = self.eligible_accounts(filter).await?;
        let mut outcomes = Vec::with_capacity(accounts.len());
        for account in accounts {
            let outcome = self.renew_contained(&account).await?;
            outcomes.push((account, outcome));
        }
        Ok(outcomes)
    }

    /// Proactively renews all active accounts whose token expires within the
    /// margin. Run before sync passes and by the token maintenance job.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the account list cannot be read.
    pub async fn ensure_all_active_valid(&self) -> Result<TokenSummary, SyncError> {
        let outcomes = self.renew_all(&AccountFilter::default()).await?;
        let mut summary = TokenSummary::default();
        for (account, outcome) in &outcomes {
            summary.record(account, outcome);
        }
        tracing::info!(
            checked = summary.checked,
            refreshed = summary.refreshed,
            recovered = summary.recovered,
            failed = summary.failed,
            invalidated = summary.invalidated,
            "token maintenance finished"
        );
        Ok(summary)
    }

    /// Operator-triggered renewal: refreshes regardless of expiry, retrying up
    /// to `attempts` times with back-off. Success clears the invalid flag.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AccountNotFound`] when the account has no stored
    /// credential, or [`SyncError`] on store failure.
    pub async fn force_refresh(
        &self,
        account_id: Uuid,
        attempts: u32,
    ) -> Result<RenewalOutcome, SyncError> {
        let account = self
            .repo
            .get(account_id)
            .await?
            .ok_or(SyncError::AccountNotFound(account_id))?;
        if account.platform != self.api.platform() {
            return Err(SyncError::PlatformUnsupported(account.platform));
        }
        let attempts = attempts.max(1);

        let mut last_failure = None;
        for attempt in 1..=attempts {
            match self.api.refresh_token(&account.refresh_token).await {
                Ok(grant) => {
                    tracing::info!(account_id = %account_id, attempt, "forced refresh succeeded");
                    return Ok(RenewalOutcome::Success(
                        self.store_grant(&account, grant, false).await?,
                    ));
                }
                Err(err) => {
                    let failure = classify(&err);
                    tracing::warn!(account_id = %account_id, attempt, attempts, error = %err, "forced refresh attempt failed");
                    last_failure = Some(failure);
                    if attempt < attempts {
                        let delay_ms = backoff_delay_ms(self.policy.backoff_base_ms, attempt);
                        tokio::time::sleep(StdDuration::from_millis(delay_ms)).await;
                    }
                }
            }
        }

        match last_failure {
            Some(failure) => self.handle_failure(&account, failure).await,
            None => Ok(RenewalOutcome::Transient("no refresh attempted".to_string())),
        }
    }

    async fn handle_failure(
        &self,
        account: &Account,
        failure: RefreshFailure,
    ) -> Result<RenewalOutcome, SyncError> {
        match failure {
            RefreshFailure::Transient(reason) => {
                tracing::warn!(account_id = %account.id, reason = %reason, "transient token refresh failure");
                self.repo.record_transient_failure(account.id, &reason).await?;
                Ok(RenewalOutcome::Transient(reason))
            }
            RefreshFailure::Permanent(reason) => {
                if let Some(renewed) = self.recover(account).await? {
                    return Ok(RenewalOutcome::Success(renewed));
                }
                self.register_permanent_failure(account, reason).await
            }
        }
    }

    /// Secondary strategy: another actor may have rotated the credential since
    /// `account` was read.
    async fn recover(&self, account: &Account) -> Result<Option<RenewedAccount>, SyncError> {
        let Some(stored) = self.repo.get(account.id).await? else {
            return Ok(None);
        };

        if stored.refresh_token != account.refresh_token {
            match self.api.refresh_token(&stored.refresh_token).await {
                Ok(grant) => {
                    tracing::info!(account_id = %account.id, "recovered with rotated refresh token");
                    return Ok(Some(self.store_grant(&stored, grant, true).await?));
                }
                Err(err) => {
                    tracing::debug!(account_id = %account.id, error = %err, "rotated refresh token also failed");
                }
            }
        }

        if stored.access_token != account.access_token
            && !stored.expires_within(Utc::now(), self.policy.refresh_margin)
        {
            tracing::info!(account_id = %account.id, "adopting stored access token that is still valid");
            self.repo.clear_failures(account.id).await?;
            return Ok(Some(RenewedAccount {
                account: stored,
                refreshed: false,
                recovered: true,
            }));
        }

        Ok(None)
    }

    async fn register_permanent_failure(
        &self,
        account: &Account,
        reason: String,
    ) -> Result<RenewalOutcome, SyncError> {
        let now = Utc::now();

        if self.repo.is_marked_invalid(account.id).await? {
            let removed = self.repo.delete_credential(account.id).await?;
            tracing::warn!(
                account_id = %account.id,
                seller_id = %account.external_seller_id,
                reason = %reason,
                "credential confirmed invalid and removed; owner must reconnect"
            );
            return Ok(RenewalOutcome::PermanentInvalidation { reason, removed });
        }

        let failures = self
            .repo
            .record_permanent_failure(account.id, &reason, now, now - self.policy.invalidation_window)
            .await?;
        if failures >= self.policy.invalidation_threshold {
            self.repo.mark_invalid(account.id, now).await?;
            tracing::warn!(account_id = %account.id, failures, "account flagged invalid");
        } else {
            tracing::warn!(account_id = %account.id, failures, reason = %reason, "token refresh rejected");
        }
        Ok(RenewalOutcome::PermanentInvalidation {
            reason,
            removed: false,
        })
    }

    async fn store_grant(
        &self,
        account: &Account,
        grant: TokenGrant,
        recovered: bool,
    ) -> Result<RenewedAccount, SyncError> {
        let refresh_token = grant
            .refresh_token
            .unwrap_or_else(|| account.refresh_token.clone());
        self.repo
            .update_tokens(account.id, &grant.access_token, &refresh_token, grant.expires_at)
            .await?;

        let mut renewed = account.clone();
        renewed.access_token = grant.access_token;
        renewed.refresh_token = refresh_token;
        renewed.expires_at = grant.expires_at;
        Ok(RenewedAccount {
            account: renewed,
            refreshed: true,
            recovered,
        })
    }
}

#[cfg(test)]
#[path = "credentials_test.rs"]
mod tests;
