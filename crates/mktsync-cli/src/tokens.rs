//! Token maintenance commands.

use clap::Subcommand;
use mktsync_core::AppConfig;
use mktsync_sync::{
    CredentialManager, CredentialPolicy, MeliApi, PgRepo, RenewalOutcome, DEFAULT_FORCE_ATTEMPTS,
};
use uuid::Uuid;

#[derive(Debug, Subcommand)]
pub enum TokensCommands {
    /// Renew every active token that expires within the refresh margin
    Ensure,
    /// Force a refresh of one account, retrying with back-off
    Refresh {
        #[arg(long)]
        account: Uuid,
        #[arg(long, default_value_t = DEFAULT_FORCE_ATTEMPTS)]
        attempts: u32,
    },
}

pub(crate) async fn run(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: TokensCommands,
) -> anyhow::Result<()> {
    let repo = PgRepo::new(pool.clone());
    let api = MeliApi::from_config(config)?;
    let manager = CredentialManager::new(&repo, &api, CredentialPolicy::from_config(config));

    match command {
        TokensCommands::Ensure => {
            let summary = manager.ensure_all_active_valid().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        TokensCommands::Refresh { account, attempts } => {
            match manager.force_refresh(account, attempts).await? {
                RenewalOutcome::Success(renewed) => println!(
                    "account {account} renewed; token valid until {}",
                    renewed.account.expires_at.to_rfc3339()
                ),
                RenewalOutcome::Transient(reason) => {
                    anyhow::bail!("refresh failed, try again later: {reason}")
                }
                RenewalOutcome::PermanentInvalidation { reason, removed } => {
                    if removed {
                        anyhow::bail!("credential removed, the seller must reconnect: {reason}");
                    }
                    anyhow::bail!("refresh token rejected: {reason}");
                }
            }
        }
    }
    Ok(())
}
