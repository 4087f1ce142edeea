//! Connected seller accounts and their API credentials.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// Marketplace an account is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Mercado Livre.
    Meli,
    /// Shopee.
    Shopee,
}

impl Platform {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Meli => "meli",
            Platform::Shopee => "shopee",
        }
    }

    /// Human-readable marketplace name stored on order rows.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Platform::Meli => "Mercado Livre",
            Platform::Shopee => "Shopee",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "meli" | "mercadolivre" | "mercado_livre" => Ok(Platform::Meli),
            "shopee" => Ok(Platform::Shopee),
            other => Err(CoreError::UnknownPlatform(other.to_string())),
        }
    }
}

/// A connected seller account together with its current credential.
#[derive(Clone)]
pub struct Account {
    pub id: Uuid,
    /// Owning user of the connection.
    pub owner_id: String,
    pub platform: Platform,
    /// Seller identifier on the marketplace (`seller` in order search).
    pub external_seller_id: String,
    pub nickname: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Account {
    /// Label used in logs and reports: nickname when set, seller id otherwise.
    #[must_use]
    pub fn label(&self) -> String {
        self.nickname
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Conta {}", self.external_seller_id))
    }

    /// `true` if the access token expires within `margin` of `now`.
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at <= now + margin
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("platform", &self.platform)
            .field("external_seller_id", &self.external_seller_id)
            .field("nickname", &self.nickname)
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Tokens issued by a successful refresh.
#[derive(Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Marketplaces that rotate refresh tokens return a new one; `None` keeps the old.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
