//! `sync` and `check` handlers. Reports are printed as pretty JSON.

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use mktsync_core::AppConfig;
use mktsync_sync::{CheckRequest, DateWindow, MeliApi, PgRepo, SyncOrchestrator, SyncRequest};
use uuid::Uuid;

/// Whole-day window: `from` at 00:00 UTC through the last millisecond of `to`.
pub(crate) fn window_from_dates(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> anyhow::Result<DateWindow> {
    if let (Some(from), Some(to)) = (from, to) {
        anyhow::ensure!(from <= to, "--from {from} is after --to {to}");
    }
    let start = from.map(|d| d.and_time(NaiveTime::MIN).and_utc());
    let end = to
        .and_then(|d| d.succ_opt())
        .map(|d| d.and_time(NaiveTime::MIN).and_utc() - TimeDelta::milliseconds(1));
    Ok(DateWindow::new(start, end))
}

pub(crate) async fn run_sync(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    account_ids: Vec<Uuid>,
    window: DateWindow,
    owner_id: Option<String>,
) -> anyhow::Result<()> {
    let repo = PgRepo::new(pool.clone());
    let api = MeliApi::from_config(config)?;
    let orchestrator = SyncOrchestrator::from_config(&repo, &api, config);

    let run = orchestrator
        .run(SyncRequest {
            account_ids,
            window,
            owner_id,
            ..SyncRequest::default()
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&run)?);
    if !run.errors.is_empty() {
        tracing::warn!(errors = run.errors.len(), "sync finished with errors");
    }
    Ok(())
}

pub(crate) async fn run_check(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    account_ids: Vec<Uuid>,
    hours: Option<i64>,
    owner_id: Option<String>,
) -> anyhow::Result<()> {
    let repo = PgRepo::new(pool.clone());
    let api = MeliApi::from_config(config)?;
    let orchestrator = SyncOrchestrator::from_config(&repo, &api, config);

    let report = orchestrator
        .check_new_orders(CheckRequest {
            account_ids,
            owner_id,
            hours,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
