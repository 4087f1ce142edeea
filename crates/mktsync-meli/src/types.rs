//! Typed views of the marketplace payloads.
//!
//! Only the fields the normalizer depends on are extracted; the full upstream
//! object is kept alongside as raw JSON for the audit blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::de;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeliOrder {
    #[serde(deserialize_with = "de::id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_datetime")]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::lenient_datetime")]
    pub date_closed: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::lenient_datetime")]
    pub date_last_updated: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de::lenient_f64")]
    pub total_amount: Option<f64>,
    #[serde(default, deserialize_with = "de::vec_or_null")]
    pub order_items: Vec<MeliOrderItem>,
    #[serde(default)]
    pub shipping: Option<OrderShipping>,
    #[serde(default)]
    pub buyer: Option<Buyer>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    pub internal_tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeliOrderItem {
    #[serde(default)]
    pub item: Option<ItemRef>,
    #[serde(default, deserialize_with = "de::lenient_f64")]
    pub quantity: Option<f64>,
    #[serde(default, deserialize_with = "de::lenient_f64")]
    pub unit_price: Option<f64>,
    /// Marketplace commission **per unit**.
    #[serde(default, deserialize_with = "de::lenient_f64")]
    pub sale_fee: Option<f64>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub listing_type_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemRef {
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub seller_sku: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub sku: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub listing_type_id: Option<String>,
}

/// The `shipping` object embedded in an order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderShipping {
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_f64")]
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Buyer {
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub nickname: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub last_name: Option<String>,
}

/// Shipment detail (`GET /shipments/{id}`).
///
/// The same shape is read from the order's embedded `shipping` object when the
/// detail request fails.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeliShipment {
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub logistic_type: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_f64")]
    pub base_cost: Option<f64>,
    #[serde(default, deserialize_with = "de::lenient_f64")]
    pub cost: Option<f64>,
    #[serde(default)]
    pub shipping_option: Option<ShippingOption>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingOption {
    #[serde(default, deserialize_with = "de::lenient_f64")]
    pub cost: Option<f64>,
    #[serde(default, deserialize_with = "de::lenient_f64")]
    pub list_cost: Option<f64>,
}

/// Envelope of `GET /orders/search`. Results stay untyped until each one is
/// parsed individually, so one malformed order cannot fail the page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrdersSearchResponse {
    #[serde(default, deserialize_with = "de::vec_or_null")]
    pub results: Vec<Value>,
    #[serde(default)]
    pub paging: Paging,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

/// An order as fetched: raw JSON for the audit blob plus its typed view.
#[derive(Debug, Clone)]
pub struct RawOrder {
    pub raw: Value,
    pub order: MeliOrder,
}

impl RawOrder {
    /// Parses a raw order value.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the value has no usable id or is not an
    /// object.
    pub fn from_value(raw: Value) -> Result<Self, serde_json::Error> {
        let order = serde_json::from_value::<MeliOrder>(raw.clone())?;
        Ok(Self { raw, order })
    }
}

#[derive(Debug, Clone)]
pub struct RawShipment {
    pub raw: Value,
    pub shipment: MeliShipment,
}

/// Where the shipment data attached to an order came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentSource {
    /// `GET /shipments/{id}` succeeded.
    Api,
    /// Detail unavailable; the order's embedded `shipping` object was used.
    OrderFallback,
    None,
}

/// Everything the normalizer needs for one order.
#[derive(Debug, Clone)]
pub struct OrderPayload {
    pub order: RawOrder,
    pub shipment: Option<RawShipment>,
    pub shipment_source: ShipmentSource,
}

impl OrderPayload {
    /// Builds a payload from the order alone, reading shipment fields from its
    /// embedded `shipping` object.
    #[must_use]
    pub fn from_order_only(order: RawOrder) -> Self {
        let embedded = order
            .raw
            .get("shipping")
            .filter(|v| v.is_object())
            .cloned()
            .and_then(|raw| {
                serde_json::from_value::<MeliShipment>(raw.clone())
                    .ok()
                    .map(|shipment| RawShipment { raw, shipment })
            });
        let shipment_source = if embedded.is_some() {
            ShipmentSource::OrderFallback
        } else {
            ShipmentSource::None
        };
        Self {
            order,
            shipment: embedded,
            shipment_source,
        }
    }

    #[must_use]
    pub fn with_shipment(order: RawOrder, shipment: RawShipment) -> Self {
        Self {
            order,
            shipment: Some(shipment),
            shipment_source: ShipmentSource::Api,
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct OrdersPage {
    pub orders: Vec<RawOrder>,
    /// Results that could not be parsed into a [`MeliOrder`].
    pub malformed: usize,
    /// Server-reported total for the query (not the page).
    pub total: u64,
}

/// Parameters of one `GET /orders/search` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSearchQuery {
    pub seller_id: String,
    pub offset: u32,
    pub limit: u32,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Body of a rejected `POST /oauth/token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRejection {
    pub status: u16,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TokenRejection {
    /// `true` when the OAuth error code says the grant itself is unusable.
    #[must_use]
    pub fn is_invalid_grant(&self) -> bool {
        self.error.as_deref().is_some_and(|code| {
            matches!(
                code.to_ascii_lowercase().as_str(),
                "invalid_grant" | "invalid_token" | "invalid_client"
            )
        })
    }
}

impl std::fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(error) = &self.error {
            write!(f, " {error}")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}
