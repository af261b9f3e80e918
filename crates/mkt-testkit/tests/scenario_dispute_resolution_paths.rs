//! Scenario: Dispute Resolution Paths
//!
//! # Invariants under test
//!
//! 1. A dispute parks the order in DISPUTED; only an admin can drive it out.
//! 2. Resolution for the client cancels the order and refunds held funds.
//! 3. Resolution for the provider completes the order and releases funds —
//!    in full by default, or a partial amount with the residual staying in
//!    escrow (PARTIALLY_RELEASED).
//! 4. The dispute record itself tracks OPEN → RESOLVED with the verdict.

use std::sync::Arc;

use mkt_gateway_sandbox::SandboxGateway;
use mkt_lifecycle::{
    Actor, BasisPointsFee, DisputeResolution, LifecycleEngine, LifecycleError,
    MarketplaceCapabilities,
};
use mkt_schemas::{event_types, Cents, DisputeStatus, OrderStatus, PaymentStatus};
use mkt_testkit::{logo_order, MemStore};
use uuid::Uuid;

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

/// Create, capture, and deliver an order, then open a dispute from the client.
async fn disputed_order(engine: &Engine) -> (Uuid, Uuid) {
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
    let (_, dispute) = engine
        .open_dispute(id, &client, "not as described", "delivered files are incomplete")
        .await
        .unwrap();
    (id, dispute.dispute_id)
}

#[tokio::test]
async fn disputed_orders_are_parked_until_an_admin_resolves() {
    let (engine, store, _gateway) = engine();
    let (id, dispute_id) = disputed_order(&engine).await;

    // Raw transitions never leave DISPUTED — not even for an admin; the only
    // exit is the resolution, which closes the dispute record as it goes.
    for actor in [Actor::client("c-1"), Actor::provider("p-1"), Actor::admin("ops")] {
        for target in [OrderStatus::Completed, OrderStatus::Cancelled] {
            let err = engine.transition(id, target, &actor, None).await.unwrap_err();
            assert_eq!(err, LifecycleError::DisputeAlreadyOpen(dispute_id));
        }
    }
    assert_eq!(store.order(id).unwrap().status, OrderStatus::Disputed);

    // And the resolution itself is admin-only.
    for actor in [Actor::client("c-1"), Actor::provider("p-1")] {
        let err = engine
            .resolve_dispute(id, dispute_id, &actor, DisputeResolution::ForClient, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized { .. }));
    }
}

#[tokio::test]
async fn resolution_for_client_cancels_and_refunds() {
    let (engine, store, gateway) = engine();
    let (id, dispute_id) = disputed_order(&engine).await;

    let resolved = engine
        .resolve_dispute(
            id,
            dispute_id,
            &Actor::admin("ops"),
            DisputeResolution::ForClient,
            Some("provider missed two revision rounds"),
        )
        .await
        .unwrap();
    assert_eq!(resolved.status, OrderStatus::Cancelled);
    assert_eq!(resolved.payment_status, PaymentStatus::Refunded);
    assert_eq!(gateway.refund_count(), 1);

    let dispute = store.dispute(dispute_id).unwrap();
    assert_eq!(dispute.status, DisputeStatus::Resolved);
    assert!(dispute.resolved_at.is_some());
    assert!(dispute.resolution.as_deref().unwrap().starts_with("for_client"));

    let types: Vec<String> = engine
        .timeline(id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert!(types.contains(&event_types::DISPUTE_RESOLVED.to_string()));
    assert!(types.contains(&event_types::PAYMENT_REFUNDED.to_string()));
}

#[tokio::test]
async fn resolution_for_provider_releases_in_full() {
    let (engine, _store, gateway) = engine();
    let (id, dispute_id) = disputed_order(&engine).await;

    let resolved = engine
        .resolve_dispute(
            id,
            dispute_id,
            &Actor::admin("ops"),
            DisputeResolution::ForProvider { partial_amount: None },
            None,
        )
        .await
        .unwrap();
    assert_eq!(resolved.status, OrderStatus::Completed);
    assert_eq!(resolved.payment_status, PaymentStatus::Released);
    assert_eq!(resolved.amount_released, Cents::new(11_500));
    assert_eq!(gateway.transfer_count(), 1);
}

#[tokio::test]
async fn partial_resolution_leaves_residual_in_escrow() {
    let (engine, store, _gateway) = engine();
    let (id, dispute_id) = disputed_order(&engine).await;

    let resolved = engine
        .resolve_dispute(
            id,
            dispute_id,
            &Actor::admin("ops"),
            DisputeResolution::ForProvider {
                partial_amount: Some(Cents::new(6_000)),
            },
            Some("half the deliverables were usable"),
        )
        .await
        .unwrap();
    assert_eq!(resolved.status, OrderStatus::Completed);
    assert_eq!(resolved.payment_status, PaymentStatus::PartiallyReleased);
    assert_eq!(resolved.amount_released, Cents::new(6_000));

    // The residual stays in escrow until a later explicit release.
    let released = engine
        .release_funds(id, None, &Actor::admin("ops"), 1)
        .await
        .unwrap();
    assert_eq!(released.payment_status, PaymentStatus::Released);
    assert_eq!(released.amount_released, Cents::new(11_500));
    assert_eq!(store.order(id).unwrap().payment_status, PaymentStatus::Released);
}

#[tokio::test]
async fn resolution_release_is_not_deduplicated_against_prior_releases() {
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
    engine.transition(id, OrderStatus::InProgress, &provider, None).await.unwrap();
    engine.transition(id, OrderStatus::Delivered, &provider, None).await.unwrap();
    engine.transition(id, OrderStatus::Completed, &client, None).await.unwrap();

    // Direct partial release at epoch 0, then a post-completion dispute
    // resolved with a further partial release. The gateway deduplicates by
    // key, so this only moves money if the two releases use distinct keys.
    engine
        .release_funds(id, Some(Cents::new(5_000)), &client, 0)
        .await
        .unwrap();
    let (_, dispute) = engine
        .open_dispute(id, &client, "scope shortfall", "one deliverable missing")
        .await
        .unwrap();
    let resolved = engine
        .resolve_dispute(
            id,
            dispute.dispute_id,
            &Actor::admin("ops"),
            DisputeResolution::ForProvider {
                partial_amount: Some(Cents::new(3_000)),
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(resolved.amount_released, Cents::new(8_000));
    assert_eq!(resolved.payment_status, PaymentStatus::PartiallyReleased);
    assert_eq!(gateway.transfer_count(), 2);
    assert_eq!(store.order(id).unwrap().amount_released, Cents::new(8_000));
}

#[tokio::test]
async fn second_open_dispute_is_refused() {
    let (engine, _store, _gateway) = engine();
    let (id, _dispute_id) = disputed_order(&engine).await;

    // DISPUTED has no edge back into DISPUTED.
    let err = engine
        .open_dispute(id, &Actor::client("c-1"), "again", "still unhappy")
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
}
