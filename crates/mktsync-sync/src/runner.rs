//! Sync Orchestrator: renew → fetch → normalize → upsert, one account at a
//! time, with failures contained to the account that caused them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use mktsync_core::{Account, AppConfig};
use mktsync_db::AccountFilter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::MarketplaceApi;
use crate::credentials::{CredentialManager, CredentialPolicy, RenewalOutcome, TokenSummary};
use crate::fetcher::{DateWindow, FetchLimits, FetchResult, OrderFetcher};
use crate::repo::{CredentialRepo, OrderRepo};
use crate::upsert::upsert_orders;
use crate::SyncError;

/// Fetch tuning shared by sync and check passes.
#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub limits: FetchLimits,
    pub page_delay: StdDuration,
    /// Bound applied to open windows that need splitting.
    pub history_days: i64,
    pub check_window_hours: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            limits: FetchLimits::default(),
            page_delay: StdDuration::from_millis(250),
            history_days: 730,
            check_window_hours: 48,
        }
    }
}

impl SyncSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            limits: FetchLimits::default(),
            page_delay: StdDuration::from_millis(config.page_delay_ms),
            history_days: config.sync_history_days,
            check_window_hours: config.check_window_hours,
        }
    }
}

/// Which accounts and orders a sync pass covers. Empty `account_ids` selects
/// every eligible account.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncRequest {
    pub account_ids: Vec<Uuid>,
    /// Re-sync exactly these orders instead of walking the window.
    pub order_ids_by_account: HashMap<Uuid, Vec<String>>,
    #[serde(flatten)]
    pub window: DateWindow,
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountSyncState {
    Completed,
    CompletedWithSkips,
    FailedToken,
    FailedFetch,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountSyncResult {
    pub account_id: Uuid,
    pub seller_id: String,
    pub label: String,
    pub state: AccountSyncState,
    pub expected_total: u64,
    pub fetched: usize,
    pub saved: usize,
    pub new_orders: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub cancelled: usize,
    pub paid: usize,
    /// The offset ceiling left orders unfetched.
    pub incomplete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccountSyncResult {
    fn empty(account: &Account, state: AccountSyncState, error: Option<String>) -> Self {
        Self {
            account_id: account.id,
            seller_id: account.external_seller_id.clone(),
            label: account.label(),
            state,
            expected_total: 0,
            fetched: 0,
            saved: 0,
            new_orders: 0,
            skipped: 0,
            duplicates: 0,
            cancelled: 0,
            paid: 0,
            incomplete: false,
            error,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncTotals {
    pub expected: u64,
    pub fetched: usize,
    pub saved: usize,
    pub new_orders: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunErrorCode {
    TokenRefreshFailed,
    FetchFailed,
    SaveErrors,
    MaxOffsetReached,
    UnitCostsUnavailable,
    PlatformUnsupported,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub account_id: Uuid,
    pub seller_id: String,
    pub code: RunErrorCode,
    pub message: String,
}

/// Report of one orchestration pass. Partial results are always returned;
/// `errors` is empty only when every account completed cleanly.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub synced_at: DateTime<Utc>,
    pub accounts: Vec<AccountSyncResult>,
    pub totals: SyncTotals,
    pub new_orders_by_account: BTreeMap<Uuid, usize>,
    pub errors: Vec<RunError>,
    pub tokens: TokenSummary,
    pub incomplete: bool,
}

impl SyncRun {
    fn new(synced_at: DateTime<Utc>) -> Self {
        Self {
            synced_at,
            accounts: Vec::new(),
            totals: SyncTotals::default(),
            new_orders_by_account: BTreeMap::new(),
            errors: Vec::new(),
            tokens: TokenSummary::default(),
            incomplete: false,
        }
    }

    fn error(&mut self, account: &Account, code: RunErrorCode, message: String) {
        self.errors.push(RunError {
            account_id: account.id,
            seller_id: account.external_seller_id.clone(),
            code,
            message,
        });
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CheckRequest {
    pub account_ids: Vec<Uuid>,
    pub owner_id: Option<String>,
    /// Defaults to the configured check window.
    pub hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountCheck {
    pub account_id: Uuid,
    pub seller_id: String,
    pub label: String,
    pub new_order_ids: Vec<String>,
    pub fetched: usize,
    pub expected_total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub checked_at: DateTime<Utc>,
    pub window_hours: i64,
    pub accounts: Vec<AccountCheck>,
    pub total_new: usize,
    pub tokens: TokenSummary,
}

pub struct SyncOrchestrator<'a, R, A> {
    repo: &'a R,
    api: &'a A,
    policy: CredentialPolicy,
    settings: SyncSettings,
}

impl<'a, R, A> SyncOrchestrator<'a, R, A>
where
    R: CredentialRepo + OrderRepo,
    A: MarketplaceApi,
{
    pub fn new(repo: &'a R, api: &'a A, policy: CredentialPolicy, settings: SyncSettings) -> Self {
        Self {
            repo,
            api,
            policy,
            settings,
        }
    }

    pub fn from_config(repo: &'a R, api: &'a A, config: &AppConfig) -> Self {
        Self::new(
            repo,
            api,
            CredentialPolicy::from_config(config),
            SyncSettings::from_config(config),
        )
    }

    fn credentials(&self) -> CredentialManager<'a, R, A> {
        CredentialManager::new(self.repo, self.api, self.policy)
    }

    fn fetcher(&self) -> OrderFetcher<'a, A> {
        OrderFetcher::new(
            self.api,
            self.settings.limits,
            self.settings.page_delay,
            self.settings.history_days,
        )
    }

    /// Runs one sync pass.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] only when the store fails systemically (account
    /// list unreadable, pool unreachable). Every other failure is reported in
    /// the returned [`SyncRun`].
    pub async fn run(&self, request: SyncRequest) -> Result<SyncRun, SyncError> {
        let mut run = SyncRun::new(Utc::now());
        let filter = AccountFilter {
            platform: None,
            owner_id: request.owner_id.clone(),
            account_ids: request.account_ids.clone(),
        };

        if !request.account_ids.is_empty() {
            self.report_unsupported(&filter, &mut run).await?;
        }

        let credentials = self.credentials();
        let accounts = credentials.eligible_accounts(&filter).await?;
        tracing::info!(accounts = accounts.len(), "sync pass started");
        let fetcher = self.fetcher();

        for account in accounts {
            let outcome = credentials.renew_contained(&account).await?;
            run.tokens.record(&account, &outcome);
            let account = match outcome {
                RenewalOutcome::Success(renewed) => renewed.account,
                failed => {
                    let reason = failed.failure_reason().unwrap_or_default().to_string();
                    tracing::warn!(account_id = %account.id, reason = %reason, "skipping account without usable token");
                    run.error(&account, RunErrorCode::TokenRefreshFailed, reason.clone());
                    run.accounts.push(AccountSyncResult::empty(
                        &account,
                        AccountSyncState::FailedToken,
                        Some(reason),
                    ));
                    continue;
                }
            };

            let fetched = match request.order_ids_by_account.get(&account.id) {
                Some(order_ids) => fetcher.fetch_specific(&account, order_ids).await,
                None => fetcher.fetch_orders(&account, request.window).await,
            };
            let fetched = match fetched {
                Ok(fetched) => fetched,
                Err(e) => {
                    tracing::error!(account_id = %account.id, error = %e, "order fetch failed");
                    run.error(&account, RunErrorCode::FetchFailed, e.to_string());
                    run.accounts.push(AccountSyncResult::empty(
                        &account,
                        AccountSyncState::FailedFetch,
                        Some(e.to_string()),
                    ));
                    continue;
                }
            };

            let result = match self.persist(&account, fetched, &fetcher, &mut run).await {
                Ok(result) => result,
                Err(e) if e.is_systemic() => return Err(e),
                Err(e) => {
                    tracing::error!(account_id = %account.id, error = %e, "order batch could not be stored");
                    run.error(&account, RunErrorCode::SaveErrors, e.to_string());
                    run.accounts.push(AccountSyncResult::empty(
                        &account,
                        AccountSyncState::FailedFetch,
                        Some(e.to_string()),
                    ));
                    continue;
                }
            };
            run.totals.expected += result.expected_total;
            run.totals.fetched += result.fetched;
            run.totals.saved += result.saved;
            run.totals.new_orders += result.new_orders;
            run.totals.skipped += result.skipped;
            run.totals.cancelled += result.cancelled;
            run.incomplete |= result.incomplete;
            run.new_orders_by_account.insert(account.id, result.new_orders);
            run.accounts.push(result);
        }

        tracing::info!(
            accounts = run.accounts.len(),
            expected = run.totals.expected,
            fetched = run.totals.fetched,
            saved = run.totals.saved,
            new_orders = run.totals.new_orders,
            errors = run.errors.len(),
            incomplete = run.incomplete,
            "sync pass finished"
        );
        Ok(run)
    }

    /// Sync over the last `check_window_hours`; used by the recurring job.
    ///
    /// # Errors
    ///
    /// See [`SyncOrchestrator::run`].
    pub async fn incremental_sync(&self) -> Result<SyncRun, SyncError> {
        self.run(SyncRequest {
            window: DateWindow::last_hours(Utc::now(), self.settings.check_window_hours),
            ..SyncRequest::default()
        })
        .await
    }

    /// Reports orders created within the check window that are not stored
    /// yet, without writing any order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the store fails systemically.
    pub async fn check_new_orders(&self, request: CheckRequest) -> Result<CheckReport, SyncError> {
        let window_hours = request
            .hours
            .filter(|h| *h > 0)
            .unwrap_or(self.settings.check_window_hours);
        let checked_at = Utc::now();
        let window = DateWindow::last_hours(checked_at, window_hours);
        let filter = AccountFilter {
            platform: None,
            owner_id: request.owner_id,
            account_ids: request.account_ids,
        };

        let mut report = CheckReport {
            checked_at,
            window_hours,
            accounts: Vec::new(),
            total_new: 0,
            tokens: TokenSummary::default(),
        };
        let credentials = self.credentials();
        let fetcher = self.fetcher();

        for account in credentials.eligible_accounts(&filter).await? {
            let outcome = credentials.renew_contained(&account).await?;
            report.tokens.record(&account, &outcome);
            let mut check = AccountCheck {
                account_id: account.id,
                seller_id: account.external_seller_id.clone(),
                label: account.label(),
                new_order_ids: Vec::new(),
                fetched: 0,
                expected_total: 0,
                error: None,
            };
            let renewed = match outcome {
                RenewalOutcome::Success(renewed) => renewed.account,
                failed => {
                    check.error = failed.failure_reason().map(str::to_string);
                    report.accounts.push(check);
                    continue;
                }
            };

            match fetcher.fetch_orders(&renewed, window).await {
                Ok(fetched) => {
                    let known = self.repo.known_order_ids(account.id).await?;
                    check.fetched = fetched.orders.len();
                    check.expected_total = fetched.expected_total;
                    check.new_order_ids = new_order_ids(&fetched, &known);
                    report.total_new += check.new_order_ids.len();
                }
                Err(e) => {
                    tracing::warn!(account_id = %account.id, error = %e, "check fetch failed");
                    check.error = Some(e.to_string());
                }
            }
            report.accounts.push(check);
        }

        tracing::info!(
            accounts = report.accounts.len(),
            total_new = report.total_new,
            window_hours,
            "new order check finished"
        );
        Ok(report)
    }

    async fn persist(
        &self,
        account: &Account,
        fetched: FetchResult,
        fetcher: &OrderFetcher<'a, A>,
        run: &mut SyncRun,
    ) -> Result<AccountSyncResult, SyncError> {
        let FetchResult {
            orders,
            expected_total,
            malformed,
            hit_ceiling,
            ..
        } = fetched;
        let fetched_count = orders.len();
        let payloads = fetcher.attach_shipments(account, orders).await;
        let report = upsert_orders(self.repo, account, payloads).await?;

        if hit_ceiling {
            run.error(
                account,
                RunErrorCode::MaxOffsetReached,
                format!(
                    "offset ceiling reached: fetched {fetched_count} of {expected_total} orders"
                ),
            );
        }
        if report.skipped > 0 {
            run.error(
                account,
                RunErrorCode::SaveErrors,
                format!("{} orders could not be saved", report.skipped),
            );
        }

        if let Some(reason) = &report.unit_cost_error {
            run.error(
                account,
                RunErrorCode::UnitCostsUnavailable,
                format!("unit costs unavailable, margins saved as net revenue: {reason}"),
            );
        }

        let skipped = report.skipped + malformed;
        let state = if skipped > 0 || hit_ceiling || report.unit_cost_error.is_some() {
            AccountSyncState::CompletedWithSkips
        } else {
            AccountSyncState::Completed
        };
        tracing::info!(
            account_id = %account.id,
            fetched = fetched_count,
            saved = report.saved,
            new_orders = report.new_orders,
            skipped,
            "account synced"
        );

        Ok(AccountSyncResult {
            account_id: account.id,
            seller_id: account.external_seller_id.clone(),
            label: account.label(),
            state,
            expected_total,
            fetched: fetched_count,
            saved: report.saved,
            new_orders: report.new_orders,
            skipped,
            duplicates: report.duplicates,
            cancelled: report.cancelled,
            paid: report.paid,
            incomplete: hit_ceiling,
            error: None,
        })
    }

    /// Explicitly selected accounts on a platform without an ingestion client.
    async fn report_unsupported(
        &self,
        filter: &AccountFilter,
        run: &mut SyncRun,
    ) -> Result<(), SyncError> {
        let platform = self.api.platform();
        for account in self.repo.list_active(filter).await? {
            if account.platform == platform {
                continue;
            }
            let message = format!("no ingestion client for platform {}", account.platform);
            tracing::warn!(account_id = %account.id, platform = %account.platform, "account platform not supported");
            run.error(&account, RunErrorCode::PlatformUnsupported, message.clone());
            run.accounts.push(AccountSyncResult::empty(
                &account,
                AccountSyncState::FailedFetch,
                Some(message),
            ));
        }
        Ok(())
    }
}

/// Fetched ids not in `known`, deduplicated, in fetch order.
fn new_order_ids(fetched: &FetchResult, known: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    fetched
        .orders
        .iter()
        .map(|o| o.order.id.as_str())
        .filter(|id| !known.contains(*id) && seen.insert(*id))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
