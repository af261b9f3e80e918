//! Scenario: Timeline Ordering and Party Listings
//!
//! # Invariants under test
//!
//! 1. The timeline is append-only and comes back in `created_at` order with
//!    the insertion sequence as tiebreak — even when many events share one
//!    timestamp.
//! 2. Party listings are scoped: a client sees only their orders, a
//!    provider only theirs, and status/date filters and pagination apply.

use std::sync::Arc;

use chrono::Utc;
use mkt_gateway_sandbox::SandboxGateway;
use mkt_lifecycle::{
    Actor, BasisPointsFee, LifecycleEngine, MarketplaceCapabilities, OrderFilter, OrderStore,
    PartyRole,
};
use mkt_schemas::{NewOrderEvent, OrderStatus};
use mkt_testkit::{copywriting_order, logo_order, MemStore};
use serde_json::json;
use uuid::Uuid;

type Engine = LifecycleEngine<MemStore, Arc<SandboxGateway>, MarketplaceCapabilities, BasisPointsFee>;

fn engine() -> (Engine, MemStore) {
    let store = MemStore::new();
    let engine = LifecycleEngine::new(
        store.clone(),
        Arc::new(SandboxGateway::new()),
        MarketplaceCapabilities,
        BasisPointsFee::new(1_000),
    );
    (engine, store)
}

#[tokio::test]
async fn same_timestamp_events_keep_insertion_order() {
    let (engine, store) = engine();
    let order = engine
        .create_order(logo_order(), &Actor::client("c-1"))
        .await
        .unwrap();

    // Append a burst of events sharing one timestamp.
    let at = Utc::now();
    for i in 0..10 {
        store
            .append_event(&NewOrderEvent {
                event_id: Uuid::new_v4(),
                order_id: order.order_id,
                event_type: "note_added".to_string(),
                description: format!("note {i}"),
                created_at: at,
                created_by: "system".to_string(),
                metadata: json!({ "i": i }),
            })
            .await
            .unwrap();
    }

    let timeline = engine.timeline(order.order_id).await.unwrap();
    assert_eq!(timeline.len(), 11);
    for pair in timeline.windows(2) {
        assert!(
            (pair[0].created_at, pair[0].seq) <= (pair[1].created_at, pair[1].seq),
            "timeline out of order at seq {} -> {}",
            pair[0].seq,
            pair[1].seq
        );
    }
    // The burst itself is in insertion order.
    let notes: Vec<String> = timeline
        .iter()
        .filter(|e| e.event_type == "note_added")
        .map(|e| e.description.clone())
        .collect();
    let expected: Vec<String> = (0..10).map(|i| format!("note {i}")).collect();
    assert_eq!(notes, expected);
}

#[tokio::test]
async fn listings_are_scoped_filtered_and_paginated() {
    let (engine, _store) = engine();
    let c1 = Actor::client("c-1");
    let c2 = Actor::client("c-2");
    let provider = Actor::provider("p-1");

    // Three orders for c-1/p-1, one for c-2/p-2.
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(engine.create_order(logo_order(), &c1).await.unwrap().order_id);
    }
    engine.create_order(copywriting_order(), &c2).await.unwrap();

    // Confirm one of c-1's orders.
    engine
        .transition(ids[0], OrderStatus::Confirmed, &provider, None)
        .await
        .unwrap();

    let all_c1 = engine
        .list_orders_by_party("c-1", PartyRole::Client, &OrderFilter::default())
        .await
        .unwrap();
    assert_eq!(all_c1.len(), 3);
    assert!(all_c1.iter().all(|o| o.client_id == "c-1"));

    let confirmed_only = engine
        .list_orders_by_party(
            "c-1",
            PartyRole::Client,
            &OrderFilter {
                statuses: vec![OrderStatus::Confirmed],
                ..OrderFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(confirmed_only.len(), 1);
    assert_eq!(confirmed_only[0].order_id, ids[0]);

    // The provider sees the same three orders from their side.
    let provider_view = engine
        .list_orders_by_party("p-1", PartyRole::Provider, &OrderFilter::default())
        .await
        .unwrap();
    assert_eq!(provider_view.len(), 3);

    // A stranger sees nothing.
    let stranger = engine
        .list_orders_by_party("c-999", PartyRole::Client, &OrderFilter::default())
        .await
        .unwrap();
    assert!(stranger.is_empty());

    // Pagination: page size 2 then the remainder.
    let page1 = engine
        .list_orders_by_party(
            "c-1",
            PartyRole::Client,
            &OrderFilter {
                limit: Some(2),
                ..OrderFilter::default()
            },
        )
        .await
        .unwrap();
    let page2 = engine
        .list_orders_by_party(
            "c-1",
            PartyRole::Client,
            &OrderFilter {
                limit: Some(2),
                offset: 2,
                ..OrderFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page1.len(), 2);
    assert_eq!(page2.len(), 1);
    let mut seen: Vec<Uuid> = page1.iter().chain(page2.iter()).map(|o| o.order_id).collect();
    seen.sort();
    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(seen, expected);

    // Date filter: nothing was created before the epoch cutoff ends.
    let none = engine
        .list_orders_by_party(
            "c-1",
            PartyRole::Client,
            &OrderFilter {
                created_to: Some(Utc::now() - chrono::Duration::days(1)),
                ..OrderFilter::default()
            },
        )
        .await
        .unwrap();
    assert!(none.is_empty());
}
