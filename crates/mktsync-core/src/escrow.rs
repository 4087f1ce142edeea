//! Shopee escrow income: platform fee and net freight.
//!
//! Shopee reports the money movement of an order in its escrow detail rather
//! than per line item, so fee and freight are derived from that object.
//!
//! Library API for importing Shopee escrow statements. The sync pipeline only
//! ingests Mercado Livre, so nothing in this workspace calls it yet.

use serde::{Deserialize, Serialize};

use crate::money::round2;

/// The `order_income` object of an escrow detail response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscrowIncome {
    #[serde(default)]
    pub commission_fee: Option<f64>,
    #[serde(default)]
    pub service_fee: Option<f64>,
    #[serde(default)]
    pub actual_shipping_fee: Option<f64>,
    #[serde(default)]
    pub reverse_shipping_fee: Option<f64>,
    #[serde(default)]
    pub shopee_shipping_rebate: Option<f64>,
    #[serde(default)]
    pub buyer_paid_shipping_fee: Option<f64>,
    #[serde(default)]
    pub shipping_fee_discount_from_3pl: Option<f64>,
}

/// Net freight derived from an [`EscrowIncome`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EscrowFreight {
    /// `(actual + reverse) - (rebate + buyer paid)`, positive when the seller pays.
    pub net_cost: f64,
    /// Rebate used in the computation (possibly the automatic one).
    pub rebate: f64,
    pub auto_rebate_applied: bool,
}

impl EscrowFreight {
    /// Net cost under the order-row sign convention (negative = cost).
    #[must_use]
    pub fn signed(&self) -> f64 {
        round2(-self.net_cost)
    }
}

fn amount(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(0.0)
}

impl EscrowIncome {
    /// Commission plus service fee, negative; `None` when both are zero.
    #[must_use]
    pub fn platform_fee(&self) -> Option<f64> {
        let total = amount(self.commission_fee) + amount(self.service_fee);
        if total > 0.0 {
            Some(-round2(total))
        } else {
            None
        }
    }

    /// Net freight with the automatic rebate rule: when the marketplace charged
    /// shipping, reported no rebate, and the buyer covered it entirely (residual
    /// under one cent), the residual is treated as rebated.
    #[must_use]
    pub fn net_freight(&self) -> EscrowFreight {
        let actual = amount(self.actual_shipping_fee);
        let reverse = amount(self.reverse_shipping_fee);
        let buyer_paid = amount(self.buyer_paid_shipping_fee);
        let mut rebate = amount(self.shopee_shipping_rebate);
        let mut auto_rebate_applied = false;

        if actual > 0.0 && rebate.abs() < f64::EPSILON {
            let implicit = actual - buyer_paid;
            if implicit < 0.01 {
                rebate = implicit;
                auto_rebate_applied = true;
            }
        }

        EscrowFreight {
            net_cost: round2((actual + reverse) - (rebate + buyer_paid)),
            rebate,
            auto_rebate_applied,
        }
    }
}
