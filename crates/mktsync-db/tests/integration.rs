//! Offline unit tests for mktsync-db pool configuration and row types.
//! These tests do not require a live database connection.

use chrono::Utc;
use mktsync_core::{AppConfig, Environment, Platform};
use mktsync_db::{AccountCredentialRow, AccountFilter, DbError, PoolConfig};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use uuid::Uuid;

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        meli_api_base_url: "https://api.mercadolibre.com".to_string(),
        meli_client_id: "app".to_string(),
        meli_client_secret: "secret".to_string(),
        http_timeout_secs: 30,
        http_user_agent: "ua".to_string(),
        http_max_retries: 2,
        http_backoff_base_ms: 1000,
        page_delay_ms: 250,
        token_refresh_margin_secs: 600,
        invalidation_threshold: 3,
        invalidation_window_hours: 24,
        check_window_hours: 48,
        sync_history_days: 730,
        token_cron: "0 */30 * * * *".to_string(),
        sync_cron: None,
    }
}

fn credential_row(platform: &str) -> AccountCredentialRow {
    AccountCredentialRow {
        id: Uuid::new_v4(),
        owner_id: "owner-1".to_string(),
        platform: platform.to_string(),
        external_seller_id: "123456".to_string(),
        nickname: Some("LOJA_TESTE".to_string()),
        access_token: "APP_USR-secret-access".to_string(),
        refresh_token: "TG-secret-refresh".to_string(),
        expires_at: Utc::now(),
        refresh_failure_count: 0,
        first_failure_at: None,
        last_failure_reason: None,
        invalid_since: None,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());

    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn credential_row_converts_to_account() {
    let row = credential_row("meli");
    let id = row.id;

    let account = row.into_account().expect("meli is a known platform");
    assert_eq!(account.id, id);
    assert_eq!(account.platform, Platform::Meli);
    assert_eq!(account.label(), "LOJA_TESTE");
}

#[test]
fn credential_row_rejects_unknown_platform() {
    let result = credential_row("amazon").into_account();
    assert!(matches!(result, Err(DbError::InvalidData(_))));
}

#[test]
fn credential_row_debug_redacts_tokens() {
    let debug = format!("{:?}", credential_row("meli"));

    assert!(!debug.contains("secret-access"));
    assert!(!debug.contains("secret-refresh"));
    assert!(debug.contains("[redacted]"));
}

#[test]
fn account_filter_default_selects_everything() {
    let filter = AccountFilter::default();

    assert!(filter.platform.is_none());
    assert!(filter.owner_id.is_none());
    assert!(filter.account_ids.is_empty());
}
