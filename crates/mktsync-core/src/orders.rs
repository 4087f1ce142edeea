use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accounts::Platform;
use crate::money::{contribution_margin, round2};

/// Version stamped into the stored raw payload blob.
pub const RAW_PAYLOAD_VERSION: i16 = 1;

/// Where the charged freight value was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargedCostSource {
    ShippingOption,
    Shipment,
    Order,
}

/// Freight figures behind an order's stored freight value.
///
/// Every field is optional: upstream payloads vary, and absence is recorded as
/// `null` rather than a made-up number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FreightBreakdown {
    /// Canonical logistics token (`self_service`, `cross_docking`, ...).
    pub logistic_type: Option<String>,
    /// `shipment` when read from the shipment detail, `order` when taken from
    /// the order's shipping mode.
    pub logistic_type_source: Option<String>,
    pub shipping_mode: Option<String>,
    pub base_cost: Option<f64>,
    pub list_cost: Option<f64>,
    pub shipping_option_cost: Option<f64>,
    pub shipment_cost: Option<f64>,
    pub order_cost_fallback: Option<f64>,
    pub charged_cost: Option<f64>,
    pub charged_cost_source: Option<ChargedCostSource>,
    pub discount: Option<f64>,
    pub total_amount: Option<f64>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub diff_base_list: Option<f64>,
    /// Output of the per-logistics-type resolver; `None` when it flagged the
    /// order for review or no logistics type was known.
    pub adjusted_cost: Option<f64>,
    pub adjustment_source: Option<String>,
    /// Fallback or review reason, if any.
    pub note: Option<String>,
}

impl FreightBreakdown {
    /// Stored freight: `adjusted ?? charged ?? order fallback ?? 0`.
    #[must_use]
    pub fn final_freight(&self) -> f64 {
        round2(
            self.adjusted_cost
                .or(self.charged_cost)
                .or(self.order_cost_fallback)
                .unwrap_or(0.0),
        )
    }
}

/// One marketplace sale in storage shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOrder {
    pub order_id: String,
    pub platform: Platform,
    pub status: String,
    pub sale_date: Option<DateTime<Utc>>,
    pub title: String,
    pub sku: Option<String>,
    pub buyer: String,
    pub quantity: i32,
    pub unit_price: f64,
    pub total_amount: f64,
    /// Negative (cost convention); `None` when no fee was reported.
    pub platform_fee: Option<f64>,
    pub freight: f64,
    pub freight_breakdown: FreightBreakdown,
    /// Display name of the logistics type (`FLEX`, `Coleta`, `Agência`, ...).
    pub logistic_type: Option<String>,
    pub shipping_mode: Option<String>,
    pub shipping_status: Option<String>,
    pub shipping_id: Option<String>,
    /// `Premium` or `Clássico`.
    pub exposure: Option<String>,
    /// `Catálogo` or `Próprio`.
    pub listing_kind: String,
    pub ads: Option<String>,
    pub tags: Vec<String>,
    pub internal_tags: Vec<String>,
    pub cmv: Option<f64>,
    pub margin: f64,
    pub is_real_margin: bool,
    /// Audit-only snapshot of the upstream objects; never read back for
    /// normalization.
    pub raw_payload: serde_json::Value,
}

impl NormalizedOrder {
    /// Applies a known SKU unit cost: sets CMV and recomputes the margin.
    pub fn apply_unit_cost(&mut self, unit_cost: Option<f64>) {
        self.cmv = unit_cost
            .filter(|c| c.is_finite())
            .map(|c| round2(c * f64::from(self.quantity)));
        let margin =
            contribution_margin(self.total_amount, self.platform_fee, self.freight, self.cmv);
        self.margin = margin.value;
        self.is_real_margin = margin.is_real;
    }
}
