use std::collections::HashSet;

use chrono::TimeZone;
use mktsync_meli::ShipmentSource;
use serde_json::json;

use super::*;
use crate::testing::{account, order_at, order_json, FakeApi};

fn small_limits() -> FetchLimits {
    FetchLimits {
        page_limit: 50,
        max_offset: 100,
    }
}

fn fetcher(api: &FakeApi, limits: FetchLimits) -> OrderFetcher<'_, FakeApi> {
    OrderFetcher::new(api, limits, StdDuration::ZERO, 30)
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap()
}

fn ids(result: &FetchResult) -> HashSet<String> {
    result.orders.iter().map(|o| o.order.id.clone()).collect()
}

#[test]
fn split_produces_contiguous_windows() {
    let from = base();
    let to = from + Duration::days(30);
    let windows = DateWindow::new(Some(from), Some(to)).split(Duration::days(14));

    assert_eq!(windows.len(), 3);
    assert_eq!(windows[0].from, Some(from));
    assert_eq!(
        windows[0].to,
        Some(from + Duration::days(14) - Duration::milliseconds(1))
    );
    assert_eq!(windows[1].from, Some(from + Duration::days(14)));
    assert_eq!(windows[2].to, Some(to));
}

#[test]
fn open_window_is_not_split() {
    let window = DateWindow::new(None, Some(base()));
    assert_eq!(window.split(Duration::days(7)), vec![window]);
}

#[test]
fn bounded_fills_only_open_sides() {
    let now = base();
    let from = now - Duration::days(3);
    let window = DateWindow::new(Some(from), None).bounded(now, 90);
    assert_eq!(window, DateWindow::new(Some(from), Some(now)));

    let window = DateWindow::default().bounded(now, 90);
    assert_eq!(window.from, Some(now - Duration::days(90)));
    assert!(window.is_bounded());
}

#[test]
fn chunk_size_depends_on_density_and_span() {
    let wide = DateWindow::new(Some(base()), Some(base() + Duration::days(60)));
    assert_eq!(split_chunk(&wide, 20_000), Some(Duration::days(14)));
    assert_eq!(split_chunk(&wide, 80_000), Some(Duration::days(7)));

    let narrow = DateWindow::new(Some(base()), Some(base() + Duration::days(4)));
    assert_eq!(split_chunk(&narrow, 20_000), Some(Duration::days(2)));

    let instant = DateWindow::new(Some(base()), Some(base() + Duration::minutes(1)));
    assert_eq!(split_chunk(&instant, 20_000), None);
}

#[tokio::test]
async fn walks_pages_in_offset_order() {
    let api = FakeApi::default();
    let orders = (0..120)
        .map(|i| order_at(&i.to_string(), base() + Duration::hours(i)))
        .collect();
    api.set_orders("100", orders);

    let result = fetcher(&api, FetchLimits::default())
        .fetch_orders(&account("100"), DateWindow::default())
        .await
        .unwrap();

    assert_eq!(result.orders.len(), 120);
    assert_eq!(result.expected_total, 120);
    assert_eq!(result.pages, 3);
    assert!(!result.hit_ceiling);
    let offsets: Vec<u32> = api.searches().iter().map(|q| q.offset).collect();
    assert_eq!(offsets, vec![0, 50, 100]);
}

#[tokio::test]
async fn dense_window_is_split_until_every_order_is_reachable() {
    let api = FakeApi::default();
    let orders = (0..150)
        .map(|i| {
            order_at(
                &i.to_string(),
                base() + Duration::hours(3 * i) + Duration::minutes(1),
            )
        })
        .collect();
    api.set_orders("100", orders);
    let window = DateWindow::new(Some(base()), Some(base() + Duration::days(20)));

    let result = fetcher(&api, small_limits())
        .fetch_orders(&account("100"), window)
        .await
        .unwrap();

    assert_eq!(ids(&result).len(), 150);
    assert_eq!(result.orders.len(), 150);
    assert_eq!(result.expected_total, 150);
    assert!(!result.hit_ceiling);
    assert!(api.searches().iter().all(|q| q.offset < 100));
}

#[tokio::test]
async fn open_window_is_bounded_before_splitting() {
    let api = FakeApi::default();
    let now = Utc::now();
    let orders = (0..150)
        .map(|i| {
            order_at(
                &i.to_string(),
                now - Duration::minutes(90 * i) - Duration::minutes(1),
            )
        })
        .collect();
    api.set_orders("100", orders);

    let result = fetcher(&api, small_limits())
        .fetch_orders(&account("100"), DateWindow::default())
        .await
        .unwrap();

    assert_eq!(ids(&result).len(), 150);
    let searches = api.searches();
    assert!(searches[0].from.is_none());
    assert!(searches[1..].iter().all(|q| q.from.is_some() && q.to.is_some()));
}

#[tokio::test]
async fn orders_sharing_one_instant_hit_the_ceiling() {
    let api = FakeApi::default();
    let instant = base() + Duration::days(5);
    let orders = (0..130).map(|i| order_at(&i.to_string(), instant)).collect();
    api.set_orders("100", orders);
    let window = DateWindow::new(Some(base()), Some(base() + Duration::days(20)));

    let result = fetcher(&api, small_limits())
        .fetch_orders(&account("100"), window)
        .await
        .unwrap();

    assert!(result.hit_ceiling);
    assert_eq!(result.orders.len(), 100);
    assert_eq!(result.expected_total, 130);
}

#[tokio::test]
async fn malformed_results_are_counted_not_fatal() {
    let api = FakeApi::default();
    api.set_orders(
        "100",
        vec![
            order_json("1", 10.0, 1),
            json!({ "status": "paid" }),
            order_json("2", 20.0, 1),
        ],
    );

    let result = fetcher(&api, FetchLimits::default())
        .fetch_orders(&account("100"), DateWindow::default())
        .await
        .unwrap();

    assert_eq!(result.orders.len(), 2);
    assert_eq!(result.malformed, 1);
}

#[tokio::test]
async fn search_failure_is_returned() {
    let api = FakeApi::default();
    api.fail_search("100", 500);

    let err = fetcher(&api, FetchLimits::default())
        .fetch_orders(&account("100"), DateWindow::default())
        .await
        .unwrap_err();

    assert!(matches!(err, MeliError::UnexpectedStatus { status: 500, .. }));
}

#[tokio::test]
async fn specific_orders_skip_missing_ids() {
    let api = FakeApi::default();
    api.set_orders("100", vec![order_json("1", 10.0, 1)]);

    let result = fetcher(&api, FetchLimits::default())
        .fetch_specific(&account("100"), &["1".to_string(), "999".to_string()])
        .await
        .unwrap();

    assert_eq!(ids(&result), HashSet::from(["1".to_string()]));
    assert_eq!(result.malformed, 1);
    assert_eq!(result.expected_total, 2);
}

#[tokio::test]
async fn shipments_fall_back_to_embedded_shipping() {
    let api = FakeApi::default();
    api.set_shipment(
        "S1",
        json!({ "id": "S1", "logistic_type": "fulfillment", "base_cost": 20.0 }),
    );
    let mut with_detail = order_json("1", 10.0, 1);
    with_detail["shipping"] = json!({ "id": "S1" });
    let mut detail_missing = order_json("2", 10.0, 1);
    detail_missing["shipping"] = json!({ "id": "S2", "logistic_type": "cross_docking" });
    let no_shipping = order_json("3", 10.0, 1);
    let orders = [with_detail, detail_missing, no_shipping]
        .into_iter()
        .map(|v| RawOrder::from_value(v).unwrap())
        .collect();

    let payloads = fetcher(&api, FetchLimits::default())
        .attach_shipments(&account("100"), orders)
        .await;

    let sources: Vec<ShipmentSource> = payloads.iter().map(|p| p.shipment_source).collect();
    assert_eq!(
        sources,
        vec![
            ShipmentSource::Api,
            ShipmentSource::OrderFallback,
            ShipmentSource::None
        ]
    );
    assert_eq!(
        payloads[0]
            .shipment
            .as_ref()
            .and_then(|s| s.shipment.logistic_type.as_deref()),
        Some("fulfillment")
    );
}
