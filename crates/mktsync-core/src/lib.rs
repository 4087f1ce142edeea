pub mod accounts;
pub mod app_config;
pub mod config;
pub mod escrow;
pub mod logistics;
pub mod money;
pub mod orders;
pub mod status;

use thiserror::Error;

pub use accounts::{Account, Platform, TokenGrant};
pub use app_config::{AppConfig, Environment};
pub use config::{build_app_config, load_app_config, load_app_config_from_env};
pub use escrow::{EscrowFreight, EscrowIncome};
pub use logistics::LogisticType;
pub use money::{contribution_margin, round2, Margin};
pub use orders::{ChargedCostSource, FreightBreakdown, NormalizedOrder, RAW_PAYLOAD_VERSION};
pub use status::{is_cancelled, is_paid};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),
}
