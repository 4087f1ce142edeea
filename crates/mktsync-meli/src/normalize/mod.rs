//! Order normalization: one fetched order (plus shipment) into a
//! [`NormalizedOrder`] row.

mod fee;
pub mod freight;

use serde_json::json;

use mktsync_core::money::finite;
use mktsync_core::{
    contribution_margin, round2, LogisticType, NormalizedOrder, Platform, RAW_PAYLOAD_VERSION,
};

use crate::error::MeliError;
use crate::types::{MeliOrder, MeliOrderItem, OrderPayload};

pub use fee::aggregate_fee;
pub use freight::{resolve_freight, resolve_freight_adjustment, FreightAdjustment, FreightInputs};

const TITLE_PLACEHOLDER: &str = "Pedido";
const BUYER_PLACEHOLDER: &str = "Comprador";
const UNKNOWN_STATUS: &str = "desconhecido";

/// Title of an order: first item's title, then any item title, then the
/// order title, then a placeholder.
#[must_use]
pub fn order_title(order: &MeliOrder) -> String {
    let item_title = |item: &MeliOrderItem| item.item.as_ref().and_then(|i| i.title.clone());
    order
        .order_items
        .first()
        .and_then(item_title)
        .or_else(|| order.order_items.iter().find_map(item_title))
        .or_else(|| order.title.clone())
        .unwrap_or_else(|| TITLE_PLACEHOLDER.to_owned())
}

fn buyer_name(order: &MeliOrder) -> String {
    let Some(buyer) = order.buyer.as_ref() else {
        return BUYER_PLACEHOLDER.to_owned();
    };
    if let Some(nickname) = &buyer.nickname {
        return nickname.clone();
    }
    let full: Vec<&str> = [buyer.first_name.as_deref(), buyer.last_name.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if full.is_empty() {
        BUYER_PLACEHOLDER.to_owned()
    } else {
        full.join(" ")
    }
}

fn exposure(listing_type_id: Option<&str>) -> Option<String> {
    listing_type_id.map(|id| {
        if id.eq_ignore_ascii_case("gold_pro") {
            "Premium".to_owned()
        } else {
            "Clássico".to_owned()
        }
    })
}

/// Normalizes one order.
///
/// Missing nested fields never fail the order; they fall back to placeholders
/// or `None`. CMV is left unset: the caller applies SKU costs with
/// [`NormalizedOrder::apply_unit_cost`].
///
/// # Errors
///
/// Returns [`MeliError::Normalization`] when the order id is blank.
pub fn normalize_order(payload: &OrderPayload) -> Result<NormalizedOrder, MeliError> {
    let order = &payload.order.order;
    if order.id.trim().is_empty() {
        return Err(MeliError::Normalization {
            order_id: order.id.clone(),
            reason: "order id is empty".to_owned(),
        });
    }

    let shipment = payload.shipment.as_ref().map(|s| &s.shipment);
    let breakdown = resolve_freight(order, shipment);
    let first_item = order.order_items.first();

    let item_quantity: f64 = order
        .order_items
        .iter()
        .filter_map(|item| finite(item.quantity))
        .sum();
    #[allow(clippy::cast_possible_truncation)]
    let quantity = (item_quantity.round() as i32).max(1);

    let total_amount = finite(order.total_amount).unwrap_or_else(|| {
        order
            .order_items
            .iter()
            .map(|item| finite(item.quantity).unwrap_or(0.0) * finite(item.unit_price).unwrap_or(0.0))
            .sum()
    });
    let total_amount = round2(total_amount);

    let unit_price = first_item
        .and_then(|item| finite(item.unit_price))
        .map_or_else(
            || {
                if item_quantity > 0.0 {
                    round2(total_amount / item_quantity)
                } else {
                    0.0
                }
            },
            round2,
        );

    let platform_fee = aggregate_fee(&order.order_items);
    let freight = breakdown.final_freight();
    let margin = contribution_margin(total_amount, platform_fee, freight, None);

    let item_ref = first_item.and_then(|item| item.item.as_ref());
    let sku = item_ref.and_then(|i| i.seller_sku.clone().or_else(|| i.sku.clone()));
    let listing_type_id = first_item
        .and_then(|item| item.listing_type_id.as_deref())
        .or_else(|| item_ref.and_then(|i| i.listing_type_id.as_deref()));

    let order_shipping = order.shipping.as_ref();
    let shipping_status = shipment
        .and_then(|s| s.status.clone())
        .or_else(|| order_shipping.and_then(|s| s.status.clone()));
    let shipping_id = shipment
        .and_then(|s| s.id.clone())
        .or_else(|| order_shipping.and_then(|s| s.id.clone()));

    let logistic_display = breakdown
        .logistic_type
        .as_deref()
        .and_then(LogisticType::parse)
        .map(|t| t.display_name().to_owned());

    let raw_payload = json!({
        "version": RAW_PAYLOAD_VERSION,
        "order": payload.order.raw,
        "shipment": payload.shipment.as_ref().map(|s| &s.raw),
        "freight": breakdown,
    });

    Ok(NormalizedOrder {
        order_id: order.id.clone(),
        platform: Platform::Meli,
        status: order
            .status
            .as_deref()
            .unwrap_or(UNKNOWN_STATUS)
            .replace('_', " "),
        sale_date: order
            .date_closed
            .or(order.date_created)
            .or(order.date_last_updated),
        title: order_title(order),
        sku,
        buyer: buyer_name(order),
        quantity,
        unit_price,
        total_amount,
        platform_fee,
        freight,
        logistic_type: logistic_display,
        shipping_mode: breakdown.shipping_mode.clone(),
        freight_breakdown: breakdown,
        shipping_status,
        shipping_id,
        exposure: exposure(listing_type_id),
        listing_kind: if order.tags.iter().any(|t| t == "catalog") {
            "Catálogo".to_owned()
        } else {
            "Próprio".to_owned()
        },
        ads: order
            .internal_tags
            .iter()
            .any(|t| t == "ads")
            .then(|| "ADS".to_owned()),
        tags: order.tags.clone(),
        internal_tags: order.internal_tags.clone(),
        cmv: None,
        margin: margin.value,
        is_real_margin: margin.is_real,
        raw_payload,
    })
}
