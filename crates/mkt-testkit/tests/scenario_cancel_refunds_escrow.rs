//! Scenario: Cancel Refunds Escrow
//!
//! # Invariants under test
//!
//! 1. Cancelling an order with HELD funds refunds them in the same commit:
//!    the store never shows CANCELLED with funds still HELD.
//! 2. CANCELLED is terminal: no further transition, capture, or release is
//!    accepted afterwards.
//! 3. Cancelling before any capture refunds nothing and leaves the payment
//!    axis at PENDING.
//! 4. Once funds are RELEASED there is no path back: the COMPLETED order
//!    has no cancel edge, and the payment axis refuses a refund.

use std::sync::Arc;

use mkt_gateway_sandbox::SandboxGateway;
use mkt_lifecycle::{
    Actor, BasisPointsFee, LifecycleEngine, LifecycleError, MarketplaceCapabilities,
};
use mkt_schemas::{event_types, Cents, OrderStatus, PaymentStatus};
use mkt_testkit::{logo_order, MemStore};

type Engine = LifecycleEngine<MemStore, Arc<SandboxGateway>, MarketplaceCapabilities, BasisPointsFee>;

fn engine() -> (Engine, MemStore, Arc<SandboxGateway>) {
    let store = MemStore::new();
    let gateway = Arc::new(SandboxGateway::new());
    let engine = LifecycleEngine::new(
        store.clone(),
        gateway.clone(),
        MarketplaceCapabilities,
        BasisPointsFee::new(1_000),
    );
    (engine, store, gateway)
}

#[tokio::test]
async fn cancel_after_capture_refunds_in_same_commit() {
    let (engine, store, gateway) = engine();
    let client = Actor::client("c-1");
    let provider = Actor::provider("p-1");

    let order = engine.create_order(logo_order(), &client).await.unwrap();
    let id = order.order_id;
    engine
        .authorize_and_hold(id, Cents::new(11_500), "USD", &client, 0)
        .await
        .unwrap();
    engine.transition(id, OrderStatus::Confirmed, &provider, None).await.unwrap();

    let cancelled = engine
        .transition(id, OrderStatus::Cancelled, &client, Some("no longer needed"))
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
    assert_eq!(gateway.refund_count(), 1);

    // The persisted row agrees — cancel and refund were one save.
    let stored = store.order(id).unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert_eq!(stored.payment_status, PaymentStatus::Refunded);

    // The cancel edge and the refund land adjacently on the timeline.
    let types: Vec<String> = engine
        .timeline(id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    let cancel_pos = types.iter().position(|t| t == event_types::ORDER_CANCELLED).unwrap();
    let refund_pos = types.iter().position(|t| t == event_types::PAYMENT_REFUNDED).unwrap();
    assert_eq!(refund_pos, cancel_pos + 1);

    // The refunded escrow cannot be released afterwards.
    let err = engine.release_funds(id, None, &client, 0).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    assert_eq!(gateway.transfer_count(), 0);
}

#[tokio::test]
async fn cancelled_is_terminal() {
    let (engine, _store, _gateway) = engine();
    let client = Actor::client("c-1");

    let order = engine.create_order(logo_order(), &client).await.unwrap();
    let id = order.order_id;
    engine.transition(id, OrderStatus::Cancelled, &client, None).await.unwrap();

    for target in [
        OrderStatus::Created,
        OrderStatus::Confirmed,
        OrderStatus::InProgress,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Disputed,
    ] {
        let err = engine
            .transition(id, target, &Actor::admin("ops"), None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, LifecycleError::InvalidTransition { .. }),
            "expected refusal of CANCELLED -> {target}"
        );
    }

    // Terminal on the payment side too: capture is refused.
    let err = engine
        .authorize_and_hold(id, Cents::new(11_500), "USD", &client, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidPaymentState { .. }));
}

#[tokio::test]
async fn cancel_before_capture_leaves_payment_pending() {
    let (engine, _store, gateway) = engine();
    let client = Actor::client("c-1");

    let order = engine.create_order(logo_order(), &client).await.unwrap();
    let cancelled = engine
        .transition(order.order_id, OrderStatus::Cancelled, &client, None)
        .await
        .unwrap();
    assert_eq!(cancelled.payment_status, PaymentStatus::Pending);
    assert_eq!(gateway.refund_count(), 0);

    let types: Vec<String> = engine
        .timeline(order.order_id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert!(!types.contains(&event_types::PAYMENT_REFUNDED.to_string()));
}

#[tokio::test]
async fn released_funds_cannot_be_clawed_back() {
    let (engine, _store, gateway) = engine();
    let client = Actor::client("c-1");
    let provider = Actor::provider("p-1");

    let order = engine.create_order(logo_order(), &client).await.unwrap();
    let id = order.order_id;
    engine
        .authorize_and_hold(id, Cents::new(11_500), "USD", &client, 0)
        .await
        .unwrap();
    engine.transition(id, OrderStatus::Confirmed, &provider, None).await.unwrap();
    engine.transition(id, OrderStatus::InProgress, &provider, None).await.unwrap();
    engine.transition(id, OrderStatus::Delivered, &provider, None).await.unwrap();
    engine.transition(id, OrderStatus::Completed, &client, None).await.unwrap();
    engine.release_funds(id, None, &client, 0).await.unwrap();

    let err = engine
        .transition(id, OrderStatus::Cancelled, &client, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    assert_eq!(gateway.refund_count(), 0);
}
