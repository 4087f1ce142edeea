//! Per-owner SKU unit costs used to fill in CMV.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::money::{from_decimal, to_decimal_opt};
use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SkuCostRow {
    pub id: i64,
    pub owner_id: String,
    pub sku: String,
    pub unit_cost: Option<Decimal>,
    pub kind: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creates or updates the cost entry for `(owner_id, sku)`.
///
/// # Errors
///
/// Returns [`DbError::InvalidData`] for a non-finite cost, or
/// [`DbError::Sqlx`] on query failure.
pub async fn upsert_sku_cost(
    pool: &PgPool,
    owner_id: &str,
    sku: &str,
    unit_cost: Option<f64>,
    kind: Option<&str>,
) -> Result<SkuCostRow, DbError> {
    let row = sqlx::query_as::<_, SkuCostRow>(
        "INSERT INTO sku_costs (owner_id, sku, unit_cost, kind) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (owner_id, sku) DO UPDATE SET \
             unit_cost = EXCLUDED.unit_cost, \
             kind = EXCLUDED.kind, \
             updated_at = NOW() \
         RETURNING id, owner_id, sku, unit_cost, kind, created_at, updated_at",
    )
    .bind(owner_id)
    .bind(sku)
    .bind(to_decimal_opt("unit_cost", unit_cost)?)
    .bind(kind)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Known unit costs for `skus`, keyed by SKU. SKUs with no row or a `NULL`
/// cost are absent from the map.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn load_unit_costs(
    pool: &PgPool,
    owner_id: &str,
    skus: &[String],
) -> Result<HashMap<String, f64>, DbError> {
    if skus.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, (String, Decimal)>(
        "SELECT sku, unit_cost FROM sku_costs \
         WHERE owner_id = $1 AND sku = ANY($2) AND unit_cost IS NOT NULL",
    )
    .bind(owner_id)
    .bind(skus)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(sku, cost)| (sku, from_decimal(cost)))
        .collect())
}
