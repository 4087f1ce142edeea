//! Database operations for the `orders` table.

use chrono::{DateTime, Utc};
use mktsync_core::{NormalizedOrder, RAW_PAYLOAD_VERSION};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::money::{to_decimal, to_decimal_opt};
use crate::DbError;

/// A stored order. Money columns come back as `NUMERIC(14,2)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub account_id: Uuid,
    pub order_id: String,
    pub platform: String,
    pub status: String,
    pub sale_date: Option<DateTime<Utc>>,
    pub title: String,
    pub sku: Option<String>,
    pub buyer: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub platform_fee: Option<Decimal>,
    pub freight: Decimal,
    pub freight_adjusted_cost: Option<Decimal>,
    pub freight_adjustment_source: Option<String>,
    pub freight_breakdown: serde_json::Value,
    pub logistic_type: Option<String>,
    pub shipping_mode: Option<String>,
    pub shipping_status: Option<String>,
    pub shipping_id: Option<String>,
    pub exposure: Option<String>,
    pub listing_kind: String,
    pub ads: Option<String>,
    pub tags: serde_json::Value,
    pub internal_tags: serde_json::Value,
    pub cmv: Option<Decimal>,
    pub margin: Decimal,
    pub is_real_margin: bool,
    pub raw_payload: serde_json::Value,
    pub raw_payload_version: i16,
    pub synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether an upsert created the row or overwrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Inserts or fully refreshes an order keyed on `(account_id, order_id)`.
///
/// Every derived column is overwritten on conflict, so a re-sync always
/// reflects the latest upstream state.
///
/// # Errors
///
/// Returns [`DbError::InvalidData`] when a money value is not finite, or
/// [`DbError::Sqlx`] on query failure.
pub async fn upsert_order(
    pool: &PgPool,
    account_id: Uuid,
    order: &NormalizedOrder,
) -> Result<UpsertOutcome, DbError> {
    let breakdown = &order.freight_breakdown;
    let breakdown_json = serde_json::to_value(breakdown)
        .map_err(|e| DbError::InvalidData(format!("freight breakdown: {e}")))?;
    let tags = serde_json::to_value(&order.tags)
        .map_err(|e| DbError::InvalidData(format!("tags: {e}")))?;
    let internal_tags = serde_json::to_value(&order.internal_tags)
        .map_err(|e| DbError::InvalidData(format!("internal_tags: {e}")))?;

    let inserted = sqlx::query_scalar::<_, bool>(
        "INSERT INTO orders ( \
             account_id, order_id, platform, status, sale_date, title, sku, buyer, \
             quantity, unit_price, total_amount, platform_fee, freight, \
             freight_base_cost, freight_list_cost, freight_charged_cost, \
             freight_adjusted_cost, freight_adjustment_source, freight_breakdown, \
             logistic_type, shipping_mode, shipping_status, shipping_id, exposure, \
             listing_kind, ads, tags, internal_tags, cmv, margin, is_real_margin, \
             raw_payload, raw_payload_version, synced_at \
         ) VALUES ( \
             $1, $2, $3, $4, $5, $6, $7, $8, \
             $9, $10, $11, $12, $13, \
             $14, $15, $16, \
             $17, $18, $19, \
             $20, $21, $22, $23, $24, \
             $25, $26, $27, $28, $29, $30, $31, \
             $32, $33, NOW() \
         ) \
         ON CONFLICT (account_id, order_id) DO UPDATE SET \
             platform = EXCLUDED.platform, \
             status = EXCLUDED.status, \
             sale_date = EXCLUDED.sale_date, \
             title = EXCLUDED.title, \
             sku = EXCLUDED.sku, \
             buyer = EXCLUDED.buyer, \
             quantity = EXCLUDED.quantity, \
             unit_price = EXCLUDED.unit_price, \
             total_amount = EXCLUDED.total_amount, \
             platform_fee = EXCLUDED.platform_fee, \
             freight = EXCLUDED.freight, \
             freight_base_cost = EXCLUDED.freight_base_cost, \
             freight_list_cost = EXCLUDED.freight_list_cost, \
             freight_charged_cost = EXCLUDED.freight_charged_cost, \
             freight_adjusted_cost = EXCLUDED.freight_adjusted_cost, \
             freight_adjustment_source = EXCLUDED.freight_adjustment_source, \
             freight_breakdown = EXCLUDED.freight_breakdown, \
             logistic_type = EXCLUDED.logistic_type, \
             shipping_mode = EXCLUDED.shipping_mode, \
             shipping_status = EXCLUDED.shipping_status, \
             shipping_id = EXCLUDED.shipping_id, \
             exposure = EXCLUDED.exposure, \
             listing_kind = EXCLUDED.listing_kind, \
             ads = EXCLUDED.ads, \
             tags = EXCLUDED.tags, \
             internal_tags = EXCLUDED.internal_tags, \
             cmv = EXCLUDED.cmv, \
             margin = EXCLUDED.margin, \
             is_real_margin = EXCLUDED.is_real_margin, \
             raw_payload = EXCLUDED.raw_payload, \
             raw_payload_version = EXCLUDED.raw_payload_version, \
             synced_at = NOW(), \
             updated_at = NOW() \
         RETURNING (xmax = 0) AS inserted",
    )
    .bind(account_id)
    .bind(&order.order_id)
    .bind(order.platform.as_str())
    .bind(&order.status)
    .bind(order.sale_date)
    .bind(&order.title)
    .bind(order.sku.as_deref())
    .bind(&order.buyer)
    .bind(order.quantity)
    .bind(to_decimal("unit_price", order.unit_price)?)
    .bind(to_decimal("total_amount", order.total_amount)?)
    .bind(to_decimal_opt("platform_fee", order.platform_fee)?)
    .bind(to_decimal("freight", order.freight)?)
    .bind(to_decimal_opt("freight_base_cost", breakdown.base_cost)?)
    .bind(to_decimal_opt("freight_list_cost", breakdown.list_cost)?)
    .bind(to_decimal_opt("freight_charged_cost", breakdown.charged_cost)?)
    .bind(to_decimal_opt("freight_adjusted_cost", breakdown.adjusted_cost)?)
    .bind(breakdown.adjustment_source.as_deref())
    .bind(breakdown_json)
    .bind(order.logistic_type.as_deref())
    .bind(order.shipping_mode.as_deref())
    .bind(order.shipping_status.as_deref())
    .bind(order.shipping_id.as_deref())
    .bind(order.exposure.as_deref())
    .bind(&order.listing_kind)
    .bind(order.ads.as_deref())
    .bind(tags)
    .bind(internal_tags)
    .bind(to_decimal_opt("cmv", order.cmv)?)
    .bind(to_decimal("margin", order.margin)?)
    .bind(order.is_real_margin)
    .bind(&order.raw_payload)
    .bind(RAW_PAYLOAD_VERSION)
    .fetch_one(pool)
    .await?;

    Ok(if inserted {
        UpsertOutcome::Inserted
    } else {
        UpsertOutcome::Updated
    })
}

/// Marketplace order ids stored for an account, most recent sale first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_order_ids_for_account(
    pool: &PgPool,
    account_id: Uuid,
) -> Result<Vec<String>, DbError> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT order_id FROM orders WHERE account_id = $1 \
         ORDER BY sale_date DESC NULLS LAST, order_id",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Fetches one stored order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_order(
    pool: &PgPool,
    account_id: Uuid,
    order_id: &str,
) -> Result<Option<OrderRow>, DbError> {
    let row = sqlx::query_as::<_, OrderRow>(
        "SELECT id, account_id, order_id, platform, status, sale_date, title, sku, buyer, \
                quantity, unit_price, total_amount, platform_fee, freight, \
                freight_adjusted_cost, freight_adjustment_source, freight_breakdown, \
                logistic_type, shipping_mode, shipping_status, shipping_id, exposure, \
                listing_kind, ads, tags, internal_tags, cmv, margin, is_real_margin, \
                raw_payload, raw_payload_version, synced_at, created_at, updated_at \
         FROM orders WHERE account_id = $1 AND order_id = $2",
    )
    .bind(account_id)
    .bind(order_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Number of orders stored for an account.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn count_orders_for_account(pool: &PgPool, account_id: Uuid) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE account_id = $1")
        .bind(account_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}
