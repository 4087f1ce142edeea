use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_positive_i64 = |var: &str, default: &str| -> Result<i64, ConfigError> {
        let raw = or_default(var, default);
        let value = raw.parse::<i64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })?;
        if value <= 0 {
            return Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: format!("must be greater than zero, got {value}"),
            });
        }
        Ok(value)
    };

    let database_url = require("DATABASE_URL")?;
    let meli_client_id = require("MKTSYNC_MELI_CLIENT_ID")?;
    let meli_client_secret = require("MKTSYNC_MELI_CLIENT_SECRET")?;

    let env = parse_environment(&or_default("MKTSYNC_ENV", "development"))?;
    let bind_addr = parse_addr("MKTSYNC_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("MKTSYNC_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("MKTSYNC_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("MKTSYNC_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("MKTSYNC_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let meli_api_base_url = or_default("MKTSYNC_MELI_API_BASE_URL", "https://api.mercadolibre.com");
    let http_timeout_secs = parse_u64("MKTSYNC_HTTP_TIMEOUT_SECS", "30")?;
    let http_user_agent = or_default("MKTSYNC_HTTP_USER_AGENT", "mktsync/0.1 (order-sync)");
    let http_max_retries = parse_u32("MKTSYNC_HTTP_MAX_RETRIES", "2")?;
    let http_backoff_base_ms = parse_u64("MKTSYNC_HTTP_BACKOFF_BASE_MS", "1000")?;
    let page_delay_ms = parse_u64("MKTSYNC_PAGE_DELAY_MS", "250")?;

    let token_refresh_margin_secs = parse_positive_i64("MKTSYNC_TOKEN_REFRESH_MARGIN_SECS", "600")?;
    let invalidation_threshold = parse_u32("MKTSYNC_INVALIDATION_THRESHOLD", "3")?.max(1);
    let invalidation_window_hours = parse_positive_i64("MKTSYNC_INVALIDATION_WINDOW_HOURS", "24")?;
    let check_window_hours = parse_positive_i64("MKTSYNC_CHECK_WINDOW_HOURS", "48")?;
    let sync_history_days = parse_positive_i64("MKTSYNC_SYNC_HISTORY_DAYS", "730")?;

    let token_cron = or_default("MKTSYNC_TOKEN_CRON", "0 */30 * * * *");
    let sync_cron = lookup("MKTSYNC_SYNC_CRON")
        .ok()
        .filter(|v| !v.trim().is_empty());

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        meli_api_base_url,
        meli_client_id,
        meli_client_secret,
        http_timeout_secs,
        http_user_agent,
        http_max_retries,
        http_backoff_base_ms,
        page_delay_ms,
        token_refresh_margin_secs,
        invalidation_threshold,
        invalidation_window_hours,
        check_window_hours,
        sync_history_days,
        token_cron,
        sync_cron,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for anything other than
/// `development`, `test` or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "MKTSYNC_ENV".to_string(),
            reason: format!("expected development, test or production, got {other:?}"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
