mod accounts;
mod sync;
mod tokens;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::accounts::AccountsCommands;
use crate::tokens::TokensCommands;

#[derive(Debug, Parser)]
#[command(name = "mktsync-cli")]
#[command(about = "Marketplace order sync command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Connected seller accounts
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Fetch, normalize and store orders
    Sync {
        /// Account to sync (repeatable); all eligible accounts when omitted
        #[arg(long = "account")]
        accounts: Vec<Uuid>,
        /// First sale date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<chrono::NaiveDate>,
        /// Last sale date to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<chrono::NaiveDate>,
        /// Restrict to accounts of one owner
        #[arg(long)]
        owner: Option<String>,
    },
    /// Count recent orders not stored yet, without writing
    Check {
        #[arg(long = "account")]
        accounts: Vec<Uuid>,
        /// Look-back window; defaults to MKTSYNC_CHECK_WINDOW_HOURS
        #[arg(long)]
        hours: Option<i64>,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Access token maintenance
    Tokens {
        #[command(subcommand)]
        command: TokensCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("mktsync-cli ready; run with --help for commands");
        return Ok(());
    };

    let config = mktsync_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = mktsync_db::PoolConfig::from_app_config(&config);
    let pool = mktsync_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            mktsync_db::ping(&pool).await?;
            println!("database ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = mktsync_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Accounts { command } => accounts::run(&pool, command).await?,
        Commands::Sync {
            accounts,
            from,
            to,
            owner,
        } => {
            let window = sync::window_from_dates(from, to)?;
            sync::run_sync(&pool, &config, accounts, window, owner).await?;
        }
        Commands::Check {
            accounts,
            hours,
            owner,
        } => sync::run_check(&pool, &config, accounts, hours, owner).await?,
        Commands::Tokens { command } => tokens::run(&pool, &config, command).await?,
    }

    Ok(())
}
