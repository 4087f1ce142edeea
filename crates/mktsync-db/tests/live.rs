//! Live integration tests for mktsync-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/mktsync-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use std::str::FromStr;

use chrono::{Duration, Utc};
use mktsync_core::{FreightBreakdown, NormalizedOrder, Platform};
use mktsync_db::{
    clear_refresh_failures, count_orders_for_account, delete_credential, get_account_credential,
    get_order, insert_account, is_account_marked_invalid, list_account_statuses,
    list_active_accounts, list_order_ids_for_account, load_unit_costs, mark_account_invalid,
    record_permanent_failure, record_transient_failure, update_tokens, upsert_credential,
    upsert_order, upsert_sku_cost, AccountFilter, UpsertOutcome,
};
use rust_decimal::Decimal;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Insert an account with a credential expiring in `expires_in` and return its id.
async fn insert_test_account(pool: &sqlx::PgPool, seller_id: &str, expires_in: Duration) -> Uuid {
    let id = insert_account(pool, "owner-1", Platform::Meli, seller_id, Some("LOJA"))
        .await
        .unwrap_or_else(|e| panic!("insert_account failed for seller '{seller_id}': {e}"));
    upsert_credential(
        pool,
        id,
        &format!("access-{seller_id}"),
        &format!("refresh-{seller_id}"),
        Utc::now() + expires_in,
    )
    .await
    .unwrap_or_else(|e| panic!("upsert_credential failed for seller '{seller_id}': {e}"));
    id
}

fn make_order(order_id: &str) -> NormalizedOrder {
    NormalizedOrder {
        order_id: order_id.to_string(),
        platform: Platform::Meli,
        status: "paid".to_string(),
        sale_date: Some(Utc::now()),
        title: "Kit Panelas".to_string(),
        sku: Some("KIT-01".to_string()),
        buyer: "COMPRADOR".to_string(),
        quantity: 1,
        unit_price: 261.7,
        total_amount: 261.7,
        platform_fee: Some(-31.4),
        freight: -71.12,
        freight_breakdown: FreightBreakdown {
            logistic_type: Some("cross_docking".to_string()),
            base_cost: Some(177.8),
            list_cost: Some(71.12),
            adjusted_cost: Some(-71.12),
            adjustment_source: Some("cross_docking".to_string()),
            ..FreightBreakdown::default()
        },
        logistic_type: Some("Coleta".to_string()),
        shipping_mode: Some("me2".to_string()),
        shipping_status: Some("shipped".to_string()),
        shipping_id: Some("44000111".to_string()),
        exposure: Some("Premium".to_string()),
        listing_kind: "Próprio".to_string(),
        ads: None,
        tags: vec!["paid".to_string()],
        internal_tags: vec![],
        cmv: None,
        margin: 159.18,
        is_real_margin: false,
        raw_payload: serde_json::json!({ "version": 1, "order": { "id": order_id } }),
    }
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ---------------------------------------------------------------------------
// Accounts and credentials
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn insert_account_is_idempotent_on_seller(pool: sqlx::PgPool) {
    let first = insert_account(&pool, "owner-1", Platform::Meli, "555", None)
        .await
        .unwrap();
    let second = insert_account(&pool, "owner-1", Platform::Meli, "555", Some("NOVO"))
        .await
        .unwrap();

    assert_eq!(first, second);
    let statuses = list_account_statuses(&pool, Some("owner-1")).await.unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].nickname.as_deref(), Some("NOVO"));
    assert!(!statuses[0].has_credential);
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_active_accounts_applies_filter(pool: sqlx::PgPool) {
    let a = insert_test_account(&pool, "100", Duration::hours(6)).await;
    let b = insert_test_account(&pool, "200", Duration::hours(6)).await;
    // An account without a credential is never selected.
    insert_account(&pool, "owner-1", Platform::Meli, "300", None)
        .await
        .unwrap();

    let all = list_active_accounts(&pool, &AccountFilter::default())
        .await
        .unwrap();
    let ids: Vec<Uuid> = all.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![a, b]);

    let only_b = list_active_accounts(
        &pool,
        &AccountFilter {
            account_ids: vec![b],
            ..AccountFilter::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(only_b.len(), 1);
    assert_eq!(only_b[0].id, b);

    let shopee = list_active_accounts(
        &pool,
        &AccountFilter {
            platform: Some(Platform::Shopee),
            ..AccountFilter::default()
        },
    )
    .await
    .unwrap();
    assert!(shopee.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_tokens_replaces_tokens_and_clears_failures(pool: sqlx::PgPool) {
    let id = insert_test_account(&pool, "100", Duration::minutes(1)).await;
    let now = Utc::now();
    record_permanent_failure(&pool, id, "invalid_grant", now, now - Duration::hours(24))
        .await
        .unwrap();
    mark_account_invalid(&pool, id, now).await.unwrap();

    let expires_at = now + Duration::hours(6);
    update_tokens(&pool, id, "access-new", "refresh-new", expires_at)
        .await
        .unwrap();

    let row = get_account_credential(&pool, id).await.unwrap().unwrap();
    assert_eq!(row.access_token, "access-new");
    assert_eq!(row.refresh_token, "refresh-new");
    assert_eq!(row.refresh_failure_count, 0);
    assert!(row.invalid_since.is_none());
    assert!(!is_account_marked_invalid(&pool, id).await.unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_tokens_fails_for_unknown_account(pool: sqlx::PgPool) {
    let result = update_tokens(&pool, Uuid::new_v4(), "a", "r", Utc::now()).await;
    assert!(matches!(result, Err(mktsync_db::DbError::NotFound)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn permanent_failures_count_within_window(pool: sqlx::PgPool) {
    let id = insert_test_account(&pool, "100", Duration::minutes(1)).await;
    let t0 = Utc::now();
    let window = Duration::hours(24);

    let c1 = record_permanent_failure(&pool, id, "invalid_grant", t0, t0 - window)
        .await
        .unwrap();
    let t1 = t0 + Duration::hours(1);
    let c2 = record_permanent_failure(&pool, id, "invalid_grant", t1, t1 - window)
        .await
        .unwrap();
    assert_eq!((c1, c2), (1, 2));

    // First failure now falls outside the window: the counter restarts.
    let t2 = t0 + Duration::hours(30);
    let c3 = record_permanent_failure(&pool, id, "invalid_grant", t2, t2 - window)
        .await
        .unwrap();
    assert_eq!(c3, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn transient_failure_does_not_count(pool: sqlx::PgPool) {
    let id = insert_test_account(&pool, "100", Duration::minutes(1)).await;

    record_transient_failure(&pool, id, "503 from upstream")
        .await
        .unwrap();

    let row = get_account_credential(&pool, id).await.unwrap().unwrap();
    assert_eq!(row.refresh_failure_count, 0);
    assert_eq!(row.last_failure_reason.as_deref(), Some("503 from upstream"));
    assert!(row.invalid_since.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn mark_invalid_then_clear(pool: sqlx::PgPool) {
    let id = insert_test_account(&pool, "100", Duration::minutes(1)).await;

    mark_account_invalid(&pool, id, Utc::now()).await.unwrap();
    assert!(is_account_marked_invalid(&pool, id).await.unwrap());

    clear_refresh_failures(&pool, id).await.unwrap();
    assert!(!is_account_marked_invalid(&pool, id).await.unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn delete_credential_removes_account_from_sync(pool: sqlx::PgPool) {
    let id = insert_test_account(&pool, "100", Duration::minutes(1)).await;

    assert!(delete_credential(&pool, id).await.unwrap());
    assert!(!delete_credential(&pool, id).await.unwrap());
    assert!(get_account_credential(&pool, id).await.unwrap().is_none());
    assert!(list_active_accounts(&pool, &AccountFilter::default())
        .await
        .unwrap()
        .is_empty());
    assert!(!is_account_marked_invalid(&pool, id).await.unwrap());
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn order_upsert_is_idempotent(pool: sqlx::PgPool) {
    let account = insert_test_account(&pool, "100", Duration::hours(6)).await;
    let order = make_order("2000001");

    let first = upsert_order(&pool, account, &order).await.unwrap();
    let second = upsert_order(&pool, account, &order).await.unwrap();

    assert_eq!(first, UpsertOutcome::Inserted);
    assert_eq!(second, UpsertOutcome::Updated);
    assert_eq!(count_orders_for_account(&pool, account).await.unwrap(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn order_upsert_persists_money_and_breakdown(pool: sqlx::PgPool) {
    let account = insert_test_account(&pool, "100", Duration::hours(6)).await;
    upsert_order(&pool, account, &make_order("2000001"))
        .await
        .unwrap();

    let row = get_order(&pool, account, "2000001").await.unwrap().unwrap();
    assert_eq!(row.platform, "meli");
    assert_eq!(row.total_amount, dec("261.70"));
    assert_eq!(row.platform_fee, Some(dec("-31.40")));
    assert_eq!(row.freight, dec("-71.12"));
    assert_eq!(row.margin, dec("159.18"));
    assert_eq!(row.freight_adjusted_cost, Some(dec("-71.12")));
    assert_eq!(row.freight_breakdown["logistic_type"], "cross_docking");
    assert_eq!(row.tags, serde_json::json!(["paid"]));
    assert_eq!(row.raw_payload_version, 1);
    assert!(row.cmv.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn order_upsert_overwrites_status_and_margin(pool: sqlx::PgPool) {
    let account = insert_test_account(&pool, "100", Duration::hours(6)).await;
    let mut order = make_order("2000001");
    upsert_order(&pool, account, &order).await.unwrap();

    order.status = "cancelled".to_string();
    order.apply_unit_cost(Some(100.0));
    upsert_order(&pool, account, &order).await.unwrap();

    let row = get_order(&pool, account, "2000001").await.unwrap().unwrap();
    assert_eq!(row.status, "cancelled");
    assert_eq!(row.cmv, Some(dec("100.00")));
    assert_eq!(row.margin, dec("59.18"));
    assert!(row.is_real_margin);
}

#[sqlx::test(migrations = "../../migrations")]
async fn order_ids_are_scoped_to_account(pool: sqlx::PgPool) {
    let a = insert_test_account(&pool, "100", Duration::hours(6)).await;
    let b = insert_test_account(&pool, "200", Duration::hours(6)).await;
    upsert_order(&pool, a, &make_order("1")).await.unwrap();
    upsert_order(&pool, a, &make_order("2")).await.unwrap();
    upsert_order(&pool, b, &make_order("1")).await.unwrap();

    let mut ids = list_order_ids_for_account(&pool, a).await.unwrap();
    ids.sort();
    assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
    assert_eq!(count_orders_for_account(&pool, b).await.unwrap(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn order_upsert_rejects_non_finite_money(pool: sqlx::PgPool) {
    let account = insert_test_account(&pool, "100", Duration::hours(6)).await;
    let mut order = make_order("2000001");
    order.freight = f64::NAN;

    let result = upsert_order(&pool, account, &order).await;
    assert!(matches!(result, Err(mktsync_db::DbError::InvalidData(_))));
    assert_eq!(count_orders_for_account(&pool, account).await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// SKU costs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn load_unit_costs_skips_unknown_and_null(pool: sqlx::PgPool) {
    upsert_sku_cost(&pool, "owner-1", "KIT-01", Some(100.0), Some("kit"))
        .await
        .unwrap();
    upsert_sku_cost(&pool, "owner-1", "CAM-01", None, None)
        .await
        .unwrap();
    upsert_sku_cost(&pool, "owner-2", "MOC-01", Some(9.9), None)
        .await
        .unwrap();

    let skus = vec![
        "KIT-01".to_string(),
        "CAM-01".to_string(),
        "MOC-01".to_string(),
        "NOPE".to_string(),
    ];
    let costs = load_unit_costs(&pool, "owner-1", &skus).await.unwrap();

    assert_eq!(costs.len(), 1);
    assert!((costs["KIT-01"] - 100.0).abs() < f64::EPSILON);
}

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_sku_cost_updates_existing(pool: sqlx::PgPool) {
    let first = upsert_sku_cost(&pool, "owner-1", "KIT-01", Some(100.0), None)
        .await
        .unwrap();
    let second = upsert_sku_cost(&pool, "owner-1", "KIT-01", Some(80.5), Some("kit"))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.unit_cost, Some(dec("80.50")));
    assert_eq!(second.kind.as_deref(), Some("kit"));
}
