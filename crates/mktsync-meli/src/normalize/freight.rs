//! Freight resolution.
//!
//! The shipment API reports three cost figures (base, list and final) whose
//! meaning depends on the logistics type. [`resolve_freight_adjustment`] picks
//! the seller's actual freight per type; [`resolve_freight`] gathers the
//! inputs from the order and shipment and records everything in a
//! [`FreightBreakdown`].

use mktsync_core::money::finite;
use mktsync_core::{round2, ChargedCostSource, FreightBreakdown, LogisticType};

use crate::types::{MeliOrder, MeliShipment};

/// Orders with a unit price under this value get the low-value rules.
pub const LOW_VALUE_THRESHOLD: f64 = 79.0;
/// Self-service freight when no discount signal exists, unit price < 79.
pub const FLEX_LOW_VALUE_FREIGHT: f64 = 15.90;
/// Self-service freight when no discount signal exists, unit price >= 79.
pub const FLEX_HIGH_VALUE_FREIGHT: f64 = 1.59;
/// Magnitude returned for combinations no rule covers.
pub const REVIEW_SENTINEL: f64 = 999.0;

/// Cost inputs for one order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FreightInputs {
    /// `order_cost / quantity`, `None` when quantity is zero or unknown.
    pub unit_price: Option<f64>,
    pub base_cost: Option<f64>,
    pub list_cost: Option<f64>,
    pub shipment_cost: Option<f64>,
}

/// Result of [`resolve_freight_adjustment`].
#[derive(Debug, Clone, PartialEq)]
pub enum FreightAdjustment {
    /// Freight determined by the rule for this logistics type. Zero is a valid
    /// override.
    Resolved {
        cost: f64,
        source: String,
        /// `true` when `base_cost` stood in for a zero/absent `list_cost`.
        used_base_cost_fallback: bool,
    },
    /// No rule applies; carries the signed sentinel and must be reviewed.
    NeedsReview { sentinel: f64 },
}

/// `list_cost`, or `base_cost` when list is zero/absent and base is not.
fn effective_list_cost(base: f64, list: f64) -> (f64, bool) {
    if list.abs() < f64::EPSILON && base.abs() >= f64::EPSILON {
        (base, true)
    } else {
        (list, false)
    }
}

/// Applies the per-logistics-type freight rule.
///
/// Missing cost figures count as zero. Signs follow the order-row convention:
/// self-service is `+1`, every other type `-1`.
#[must_use]
pub fn resolve_freight_adjustment(
    logistic_type: &LogisticType,
    inputs: &FreightInputs,
) -> FreightAdjustment {
    let base = finite(inputs.base_cost).unwrap_or(0.0);
    let list = finite(inputs.list_cost).unwrap_or(0.0);
    let shipment = finite(inputs.shipment_cost).unwrap_or(0.0);
    let unit = finite(inputs.unit_price);
    let low_value = unit.is_some_and(|u| u < LOW_VALUE_THRESHOLD);
    let source = logistic_type.adjustment_label().to_owned();

    let resolved = |cost: f64, used_base_cost_fallback: bool| FreightAdjustment::Resolved {
        cost: round2(cost),
        source: source.clone(),
        used_base_cost_fallback,
    };

    match logistic_type {
        LogisticType::SelfService => {
            let value = if round2(base - list).abs() < f64::EPSILON {
                if low_value {
                    FLEX_LOW_VALUE_FREIGHT
                } else {
                    FLEX_HIGH_VALUE_FREIGHT
                }
            } else {
                base - list
            };
            resolved(value, false)
        }
        LogisticType::CrossDocking => {
            if low_value {
                return resolved(0.0, false);
            }
            let (effective, fallback) = effective_list_cost(base, list);
            resolved((effective - shipment) * -1.0, fallback)
        }
        LogisticType::DropOff | LogisticType::XdDropOff | LogisticType::Fulfillment => {
            let (effective, fallback) = effective_list_cost(base, list);
            let diff = effective - shipment;
            if unit.is_some_and(|u| u > LOW_VALUE_THRESHOLD) {
                resolved(diff.abs() * -1.0, fallback)
            } else {
                resolved(diff * -1.0, fallback)
            }
        }
        LogisticType::Other(_) if low_value => resolved(0.0, false),
        LogisticType::Other(_) => FreightAdjustment::NeedsReview {
            sentinel: -REVIEW_SENTINEL,
        },
    }
}

/// Number of units in the order: summed item quantities, else the number of
/// items, else 1 when a total exists.
pub(crate) fn order_quantity(order: &MeliOrder) -> Option<f64> {
    let reported: Vec<f64> = order
        .order_items
        .iter()
        .filter_map(|item| finite(item.quantity))
        .collect();
    if !reported.is_empty() {
        return Some(reported.iter().sum());
    }
    if !order.order_items.is_empty() {
        #[allow(clippy::cast_precision_loss)]
        return Some(order.order_items.len() as f64);
    }
    finite(order.total_amount).map(|_| 1.0)
}

/// Builds the freight breakdown for one order.
///
/// `shipment` is the detail from the shipment endpoint, or the order's own
/// `shipping` object when the detail could not be fetched.
#[must_use]
pub fn resolve_freight(order: &MeliOrder, shipment: Option<&MeliShipment>) -> FreightBreakdown {
    let order_shipping = order.shipping.as_ref();
    let shipping_mode = order_shipping.and_then(|s| s.mode.clone());

    let shipment_type = shipment.and_then(|s| s.logistic_type.clone());
    let (raw_type, type_source) = match (shipment_type, &shipping_mode) {
        (Some(t), _) => (Some(t), Some("shipment")),
        (None, Some(mode)) => (Some(mode.clone()), Some("order")),
        (None, None) => (None, None),
    };

    let option = shipment.and_then(|s| s.shipping_option.as_ref());
    let base_cost = shipment.and_then(|s| finite(s.base_cost));
    let option_cost = option.and_then(|o| finite(o.cost));
    let list_cost = option.and_then(|o| finite(o.list_cost));
    let shipment_cost = shipment.and_then(|s| finite(s.cost));
    let order_cost = order_shipping.and_then(|s| finite(s.cost));

    let (charged_cost, charged_cost_source) = if let Some(cost) = option_cost {
        (Some(round2(cost)), Some(ChargedCostSource::ShippingOption))
    } else if let Some(cost) = shipment_cost {
        (Some(round2(cost)), Some(ChargedCostSource::Shipment))
    } else if let Some(cost) = order_cost {
        (Some(round2(cost)), Some(ChargedCostSource::Order))
    } else {
        (None, None)
    };

    let total_amount = finite(order.total_amount);
    let quantity = order_quantity(order);
    let unit_price = match (total_amount, quantity) {
        (Some(total), Some(qty)) if qty > 0.0 => Some(round2(total / qty)),
        (Some(total), _) => Some(round2(total)),
        _ => None,
    };

    // The resolver sees the unit price recomputed from the order cost.
    let resolver_unit_price = match (unit_price, quantity) {
        (Some(unit), Some(qty)) if qty.abs() >= f64::EPSILON => Some((unit * qty) / qty),
        _ => None,
    };

    let logistic_type = raw_type.as_deref().and_then(LogisticType::parse);

    let mut breakdown = FreightBreakdown {
        logistic_type: logistic_type.as_ref().map(|t| t.as_str().to_owned()),
        logistic_type_source: type_source.map(str::to_owned),
        shipping_mode,
        base_cost,
        list_cost,
        shipping_option_cost: option_cost.map(round2),
        shipment_cost: shipment_cost.map(round2),
        order_cost_fallback: order_cost.map(round2),
        charged_cost,
        charged_cost_source,
        discount: match (list_cost, charged_cost) {
            (Some(list), Some(charged)) => Some(round2(list - charged)),
            _ => None,
        },
        total_amount,
        quantity,
        unit_price,
        diff_base_list: match (base_cost, list_cost) {
            (Some(base), Some(list)) => Some(round2(base - list)),
            _ => None,
        },
        adjusted_cost: None,
        adjustment_source: None,
        note: None,
    };

    let Some(logistic_type) = logistic_type else {
        let note = if breakdown.charged_cost.is_some() || breakdown.order_cost_fallback.is_some() {
            "no logistic type; using charged cost"
        } else {
            "no freight data available"
        };
        tracing::debug!(order_id = %order.id, note, "freight fallback");
        breakdown.note = Some(note.to_owned());
        return breakdown;
    };

    let inputs = FreightInputs {
        unit_price: resolver_unit_price,
        base_cost,
        list_cost,
        shipment_cost,
    };

    match resolve_freight_adjustment(&logistic_type, &inputs) {
        FreightAdjustment::Resolved {
            cost,
            source,
            used_base_cost_fallback,
        } => {
            breakdown.adjusted_cost = Some(cost);
            breakdown.adjustment_source = Some(source);
            if used_base_cost_fallback {
                tracing::debug!(
                    order_id = %order.id,
                    logistic_type = %logistic_type,
                    base_cost = ?base_cost,
                    "list cost missing, used base cost"
                );
                breakdown.note = Some("used base_cost fallback".to_owned());
            }
        }
        FreightAdjustment::NeedsReview { sentinel } => {
            tracing::debug!(
                order_id = %order.id,
                logistic_type = %logistic_type,
                sentinel,
                "no freight rule for logistic type, flagged for review"
            );
            breakdown.note = Some(format!(
                "no freight rule for logistic type '{logistic_type}'; review required"
            ));
        }
    }

    breakdown
}

#[cfg(test)]
#[path = "freight_test.rs"]
mod tests;
