//! Marketplace logistics (fulfillment) types.

use serde::{Deserialize, Serialize};

/// Normalized logistics type of a shipment.
///
/// Upstream sends free-form strings in several spellings; [`LogisticType::parse`]
/// collapses them to one of these variants. Anything unrecognized is kept
/// verbatim (lowercased) in [`LogisticType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogisticType {
    /// Seller-delivered ("Flex").
    SelfService,
    /// Carrier pickup at the seller ("Coleta").
    CrossDocking,
    /// Seller drops the parcel at a post office ("Correios").
    DropOff,
    /// Seller drops the parcel at a partner agency ("Agência").
    XdDropOff,
    /// Stocked in the marketplace warehouse ("Full").
    Fulfillment,
    Other(String),
}

impl LogisticType {
    /// Parses a raw logistics type; `None` for empty input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.trim().to_lowercase();
        if token.is_empty() {
            return None;
        }
        Some(match token.as_str() {
            "self_service" | "flex" => LogisticType::SelfService,
            "cross_docking" | "coleta" => LogisticType::CrossDocking,
            "drop_off" | "correios" => LogisticType::DropOff,
            "xd_drop_off" | "agência" | "agencia" => LogisticType::XdDropOff,
            "fulfillment" | "full" => LogisticType::Fulfillment,
            _ => LogisticType::Other(token),
        })
    }

    /// Canonical token, as sent by the marketplace.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            LogisticType::SelfService => "self_service",
            LogisticType::CrossDocking => "cross_docking",
            LogisticType::DropOff => "drop_off",
            LogisticType::XdDropOff => "xd_drop_off",
            LogisticType::Fulfillment => "fulfillment",
            LogisticType::Other(raw) => raw,
        }
    }

    /// Label recorded as the source of a freight adjustment.
    #[must_use]
    pub fn adjustment_label(&self) -> &str {
        match self {
            LogisticType::SelfService => "FLEX",
            LogisticType::CrossDocking => "Coleta",
            LogisticType::DropOff => "Correios",
            LogisticType::XdDropOff => "Agência",
            LogisticType::Fulfillment => "FULL",
            LogisticType::Other(raw) => raw,
        }
    }

    /// Name shown on order rows.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            LogisticType::SelfService => "FLEX",
            LogisticType::CrossDocking => "Coleta",
            LogisticType::XdDropOff => "Agência",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for LogisticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
