//! Order ingestion pipeline.
//!
//! [`SyncOrchestrator`] drives, per account, the [`CredentialManager`], the
//! [`OrderFetcher`] and the upsert layer. Storage and the marketplace are
//! reached through the [`CredentialRepo`], [`OrderRepo`] and
//! [`MarketplaceApi`] traits; [`PgRepo`] and [`MeliApi`] are the production
//! implementations.

pub mod api;
pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod pg;
pub mod repo;
pub mod runner;
pub mod upsert;

#[cfg(test)]
mod testing;

pub use api::{MarketplaceApi, MeliApi};
pub use credentials::{
    classify, CredentialManager, CredentialPolicy, RefreshFailure, RenewalOutcome, RenewedAccount,
    TokenAccountStatus, TokenStatus, TokenSummary, DEFAULT_FORCE_ATTEMPTS,
};
pub use error::SyncError;
pub use fetcher::{DateWindow, FetchLimits, FetchResult, OrderFetcher, MAX_OFFSET};
pub use pg::PgRepo;
pub use repo::{CredentialRepo, OrderRepo};
pub use runner::{
    AccountCheck, AccountSyncResult, AccountSyncState, CheckReport, CheckRequest, RunError,
    RunErrorCode, SyncOrchestrator, SyncRequest, SyncRun, SyncSettings, SyncTotals,
};
pub use upsert::{upsert_orders, OrderFailure, UpsertReport};
