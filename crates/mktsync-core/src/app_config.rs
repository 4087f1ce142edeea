use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub meli_api_base_url: String,
    pub meli_client_id: String,
    pub meli_client_secret: String,
    pub http_timeout_secs: u64,
    pub http_user_agent: String,
    pub http_max_retries: u32,
    pub http_backoff_base_ms: u64,
    pub page_delay_ms: u64,
    pub token_refresh_margin_secs: i64,
    pub invalidation_threshold: u32,
    pub invalidation_window_hours: i64,
    pub check_window_hours: i64,
    pub sync_history_days: i64,
    pub token_cron: String,
    pub sync_cron: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("meli_api_base_url", &self.meli_api_base_url)
            .field("meli_client_id", &self.meli_client_id)
            .field("meli_client_secret", &"[redacted]")
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("http_user_agent", &self.http_user_agent)
            .field("http_max_retries", &self.http_max_retries)
            .field("http_backoff_base_ms", &self.http_backoff_base_ms)
            .field("page_delay_ms", &self.page_delay_ms)
            .field("token_refresh_margin_secs", &self.token_refresh_margin_secs)
            .field("invalidation_threshold", &self.invalidation_threshold)
            .field("invalidation_window_hours", &self.invalidation_window_hours)
            .field("check_window_hours", &self.check_window_hours)
            .field("sync_history_days", &self.sync_history_days)
            .field("token_cron", &self.token_cron)
            .field("sync_cron", &self.sync_cron)
            .finish()
    }
}
