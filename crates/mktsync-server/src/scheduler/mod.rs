//! Background job scheduler.
//!
//! Registers the periodic token-maintenance pass and, when configured, an
//! incremental order sync. Both share the server's sync lock with the HTTP
//! handlers; a tick that finds the lock held is skipped.

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use mktsync_sync::{CredentialManager, CredentialPolicy, SyncOrchestrator};

use crate::api::AppState;

/// Builds and starts the background job scheduler.
///
/// The returned handle must be kept alive for the lifetime of the process;
/// dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(state: AppState) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_token_job(&scheduler, state.clone()).await?;
    if let Some(cron) = state.config.sync_cron.clone() {
        register_sync_job(&scheduler, &cron, state).await?;
    }

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_token_job(
    scheduler: &JobScheduler,
    state: AppState,
) -> Result<(), JobSchedulerError> {
    let cron = state.config.token_cron.clone();

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let state = state.clone();
        Box::pin(async move {
            run_token_job(&state).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: registered token job");
    Ok(())
}

async fn run_token_job(state: &AppState) {
    let Ok(_guard) = state.sync_lock.try_lock() else {
        tracing::info!("scheduler: token pass skipped, another pass is running");
        return;
    };

    let manager = CredentialManager::new(
        &state.repo,
        &state.api,
        CredentialPolicy::from_config(&state.config),
    );
    match manager.ensure_all_active_valid().await {
        Ok(summary) => tracing::info!(
            checked = summary.checked,
            refreshed = summary.refreshed,
            recovered = summary.recovered,
            failed = summary.failed,
            invalidated = summary.invalidated,
            "scheduler: token pass complete"
        ),
        Err(e) => tracing::error!(error = %e, "scheduler: token pass failed"),
    }
}

async fn register_sync_job(
    scheduler: &JobScheduler,
    cron: &str,
    state: AppState,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let state = state.clone();
        Box::pin(async move {
            run_sync_job(&state).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: registered incremental sync job");
    Ok(())
}

async fn run_sync_job(state: &AppState) {
    let Ok(_guard) = state.sync_lock.try_lock() else {
        tracing::info!("scheduler: incremental sync skipped, another pass is running");
        return;
    };

    tracing::info!("scheduler: starting incremental sync");
    let orchestrator = SyncOrchestrator::from_config(&state.repo, &state.api, &state.config);
    match orchestrator.incremental_sync().await {
        Ok(run) => tracing::info!(
            accounts = run.accounts.len(),
            saved = run.totals.saved,
            errors = run.errors.len(),
            incomplete = run.incomplete,
            "scheduler: incremental sync complete"
        ),
        Err(e) => tracing::error!(error = %e, "scheduler: incremental sync aborted"),
    }
}
