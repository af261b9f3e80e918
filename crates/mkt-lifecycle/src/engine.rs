//! Order Lifecycle Engine — the SINGLE choke-point for all order mutations.
//!
//! # Invariants
//!
//! 1. **Legal transitions only.** Every order mutation goes through the
//!    transition table in [`crate::transitions`]; illegal edges are refused
//!    with `InvalidTransition` before any side effect.
//! 2. **One event per transition.** Each state change on either axis commits
//!    exactly one timeline event, atomically with the order row
//!    (`OrderStore::save_order` owns atomicity).
//! 3. **Payment follows the order.** Funds are released only from the
//!    COMPLETED / dispute-resolution paths and refunded only inside the
//!    CANCELLED edge — a RELEASED payment on a non-completed order is
//!    unreachable by construction.
//! 4. **Gateway first, persist second.** Payment-port calls happen before
//!    the store write. A crash or version conflict in between is healed by
//!    the retry: the same idempotency key makes the gateway replay the
//!    original outcome instead of moving money twice.
//!
//! All collaborators are injected (store, gateway, capability checker, fee
//! policy); there is no process-wide mutable default of any of them.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use mkt_payments::{
    dispute_release_idempotency_key, payment_idempotency_key, AuthorizeRequest, GatewayError,
    IdempotencyKey, IntentRef, PaymentGateway, PaymentOp,
};
use mkt_schemas::{
    event_types, Cents, DeliveryFile, DisputeStatus, NewOrderEvent, Order, OrderDelivery,
    OrderDispute, OrderEvent, OrderReview, OrderStatus, PaymentStatus, PriceBreakdown,
};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::capability::{Actor, CapabilityCheck, PartyRole};
use crate::error::LifecycleError;
use crate::policy::FeePolicy;
use crate::store::{OrderFilter, OrderStore};
use crate::transitions::{order_transition_allowed, transition_event_type};

/// Default bound on any single payment-port call.
pub const DEFAULT_PAYMENT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Operation inputs
// ---------------------------------------------------------------------------

/// Parameters for creating an order (purchase intent).
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub client_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub title: String,
    pub description: String,
    pub price: PriceBreakdown,
    pub deadline: Option<chrono::DateTime<Utc>>,
}

/// Parameters for a provider's delivery submission.
#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub description: String,
    pub files: Vec<DeliveryFile>,
    pub notes: Option<String>,
}

/// Outcome directions for dispute resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisputeResolution {
    /// Order completes; held funds are released to the provider. A partial
    /// amount releases only that much (PARTIALLY_RELEASED).
    ForProvider { partial_amount: Option<Cents> },
    /// Order cancels; held funds are refunded to the client in full.
    ForClient,
}

// Outcome of a bounded gateway call: a decline is a definitive processor
// decision the caller must record, unlike transport/timeout ambiguity.
enum PortOutcome<T> {
    Ok(T),
    Declined(String),
}

// ---------------------------------------------------------------------------
// LifecycleEngine
// ---------------------------------------------------------------------------

/// The order/payment lifecycle state machine.
///
/// Generic over its four ports so production wiring (PgStore + REST gateway)
/// and tests (MemStore + sandbox gateway) use the same code path. Safe to
/// share across any number of concurrent tasks; per-order mutual exclusion
/// comes from the store's optimistic version check.
pub struct LifecycleEngine<S, G, C, F> {
    store: S,
    gateway: G,
    capabilities: C,
    fees: F,
    payment_timeout: Duration,
}

impl<S, G, C, F> LifecycleEngine<S, G, C, F>
where
    S: OrderStore,
    G: PaymentGateway,
    C: CapabilityCheck,
    F: FeePolicy,
{
    pub fn new(store: S, gateway: G, capabilities: C, fees: F) -> Self {
        Self {
            store,
            gateway,
            capabilities,
            fees,
            payment_timeout: DEFAULT_PAYMENT_TIMEOUT,
        }
    }

    /// Override the per-call payment-port bound.
    pub fn with_payment_timeout(mut self, timeout: Duration) -> Self {
        self.payment_timeout = timeout;
        self
    }

    // -----------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------

    /// Record a purchase intent: a CREATED order with payment PENDING.
    pub async fn create_order(
        &self,
        spec: NewOrder,
        actor: &Actor,
    ) -> Result<Order, LifecycleError> {
        spec.price.validate().map_err(LifecycleError::InvalidPrice)?;

        let now = Utc::now();
        let order = Order {
            order_id: Uuid::new_v4(),
            client_id: spec.client_id,
            provider_id: spec.provider_id,
            service_id: spec.service_id,
            title: spec.title,
            description: spec.description,
            status: OrderStatus::Created,
            payment_status: PaymentStatus::Pending,
            price: spec.price,
            payment_intent_ref: None,
            amount_held: Cents::ZERO,
            amount_released: Cents::ZERO,
            deadline: spec.deadline,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        let event = self.event(
            &order,
            event_types::ORDER_CREATED,
            format!("order created for service {}", order.service_id),
            actor,
            json!({ "service_id": order.service_id, "total": order.price.total }),
        );
        self.store.insert_order(&order, &event).await?;

        info!(order_id = %order.order_id, "order created");
        Ok(order)
    }

    // -----------------------------------------------------------------
    // Order-axis transition
    // -----------------------------------------------------------------

    /// Drive an order along one edge of the transition table.
    ///
    /// The CANCELLED edge refunds held funds as part of the same operation;
    /// a refund never happens independently of an order-status change.
    ///
    /// The DISPUTED edges are not reachable here: entering carries a dispute
    /// record ([`Self::open_dispute`]) and leaving carries a verdict, the
    /// record's closure, and the coupled payment move
    /// ([`Self::resolve_dispute`]).
    pub async fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: &Actor,
        notes: Option<&str>,
    ) -> Result<Order, LifecycleError> {
        let mut order = self.store.load_order(order_id).await?;
        let from = order.status;

        if !order_transition_allowed(from, target) {
            warn!(order_id = %order_id, %from, to = %target, "transition refused: off-table");
            return Err(LifecycleError::InvalidTransition { from, to: target });
        }
        if target == OrderStatus::Disputed {
            warn!(order_id = %order_id, %from, "transition refused: disputes open via open_dispute");
            return Err(LifecycleError::InvalidTransition { from, to: target });
        }
        if from == OrderStatus::Disputed {
            warn!(order_id = %order_id, to = %target, "transition refused: disputes exit via resolve_dispute");
            return Err(match self.store.find_open_dispute(order_id).await? {
                Some(dispute) => LifecycleError::DisputeAlreadyOpen(dispute.dispute_id),
                None => LifecycleError::InvalidTransition { from, to: target },
            });
        }
        if !self.capabilities.may_transition(actor, &order, target) {
            warn!(order_id = %order_id, actor = %actor.label(), to = %target, "transition refused: unauthorized");
            return Err(LifecycleError::Unauthorized {
                actor: actor.label(),
                action: format!("transition to {target}"),
            });
        }

        let expected_version = order.version;
        let now = Utc::now();
        let mut events = vec![self.event(
            &order,
            transition_event_type(target),
            match notes {
                Some(n) => format!("{from} -> {target}: {n}"),
                None => format!("{from} -> {target}"),
            },
            actor,
            json!({ "from": from, "to": target }),
        )];

        if target == OrderStatus::Cancelled {
            if let Some(refund_event) = self.refund_on_cancel(&mut order, actor).await? {
                events.push(refund_event);
            }
        }

        order.status = target;
        order.updated_at = now;
        order.version = self.store.save_order(&order, expected_version, &events).await?;

        info!(order_id = %order_id, %from, to = %target, actor = %actor.label(), "order transitioned");
        Ok(order)
    }

    // -----------------------------------------------------------------
    // Payment operations
    // -----------------------------------------------------------------

    /// Authorize and capture the client's payment into escrow.
    ///
    /// Success: payment PENDING -> HELD, event `payment_captured`.
    /// Processor decline: payment -> FAILED, event `payment_failed`, and the
    /// call returns `PaymentFailed`; the order status is untouched either
    /// way. Ambiguous outcomes (timeout/transport) change nothing and
    /// surface `PaymentPortTimeout` — retry with the same `attempt_epoch`.
    pub async fn authorize_and_hold(
        &self,
        order_id: Uuid,
        amount: Cents,
        currency: &str,
        actor: &Actor,
        attempt_epoch: u64,
    ) -> Result<Order, LifecycleError> {
        let mut order = self.store.load_order(order_id).await?;

        if !self.is_order_party(actor, &order) {
            return Err(LifecycleError::Unauthorized {
                actor: actor.label(),
                action: "capture payment".to_string(),
            });
        }
        if order.status.is_terminal() {
            return Err(LifecycleError::InvalidPaymentState {
                payment_status: order.payment_status,
                operation: "capture on a cancelled order",
            });
        }
        if order.payment_status != PaymentStatus::Pending {
            return Err(LifecycleError::InvalidPaymentState {
                payment_status: order.payment_status,
                operation: "capture",
            });
        }
        if !amount.is_positive() {
            return Err(LifecycleError::InvalidAmount(format!(
                "capture amount must be positive, got {amount}"
            )));
        }
        if currency != order.price.currency {
            return Err(LifecycleError::InvalidAmount(format!(
                "currency {currency} does not match order currency {}",
                order.price.currency
            )));
        }

        let expected_version = order.version;

        let auth_key = payment_idempotency_key(order_id, PaymentOp::Authorize, attempt_epoch);
        let auth_req = AuthorizeRequest {
            amount,
            currency: currency.to_string(),
            metadata: json!({
                "order_id": order_id,
                "client_id": order.client_id,
                "provider_id": order.provider_id,
            }),
        };
        let intent = match self
            .port_call(PaymentOp::Authorize, self.gateway.authorize(auth_req, &auth_key))
            .await?
        {
            PortOutcome::Ok(intent) => intent,
            PortOutcome::Declined(message) => {
                return self
                    .record_payment_failure(order, expected_version, actor, None, message)
                    .await;
            }
        };

        let capture_key = payment_idempotency_key(order_id, PaymentOp::Capture, attempt_epoch);
        let charge = match self
            .port_call(PaymentOp::Capture, self.gateway.capture(&intent, &capture_key))
            .await?
        {
            PortOutcome::Ok(charge) => charge,
            PortOutcome::Declined(message) => {
                return self
                    .record_payment_failure(order, expected_version, actor, Some(intent), message)
                    .await;
            }
        };

        order.payment_status = PaymentStatus::Held;
        order.payment_intent_ref = Some(intent.as_str().to_string());
        order.amount_held = charge.amount;
        order.updated_at = Utc::now();

        let event = self.event(
            &order,
            event_types::PAYMENT_CAPTURED,
            format!("captured {} {} into escrow", charge.amount, charge.currency),
            actor,
            json!({
                "amount_cents": charge.amount,
                "currency": charge.currency,
                "intent": intent.as_str(),
            }),
        );
        order.version = self.store.save_order(&order, expected_version, &[event]).await?;

        info!(order_id = %order_id, amount = %charge.amount, "payment captured and held");
        Ok(order)
    }

    /// Release escrowed funds to the provider.
    ///
    /// Legal only once the order is COMPLETED. `amount` defaults to the full
    /// remaining held amount; the provider receives `amount - platform_fee`.
    /// Payment becomes RELEASED when everything held has been released,
    /// PARTIALLY_RELEASED otherwise.
    pub async fn release_funds(
        &self,
        order_id: Uuid,
        amount: Option<Cents>,
        actor: &Actor,
        attempt_epoch: u64,
    ) -> Result<Order, LifecycleError> {
        let mut order = self.store.load_order(order_id).await?;

        if !self.is_order_party(actor, &order) {
            return Err(LifecycleError::Unauthorized {
                actor: actor.label(),
                action: "release funds".to_string(),
            });
        }
        if order.status != OrderStatus::Completed {
            return Err(LifecycleError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Completed,
            });
        }

        let expected_version = order.version;
        let key = payment_idempotency_key(order_id, PaymentOp::Release, attempt_epoch);
        let event = self.do_release(&mut order, amount, actor, key).await?;
        order.updated_at = Utc::now();
        order.version = self.store.save_order(&order, expected_version, &[event]).await?;

        Ok(order)
    }

    // -----------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------

    /// Submit completed work. Valid from CONFIRMED or IN_PROGRESS; forces
    /// the order to DELIVERED. From CONFIRMED the IN_PROGRESS edge is
    /// applied first so the transition table stays closed — both steps are
    /// recorded on the timeline.
    pub async fn submit_delivery(
        &self,
        order_id: Uuid,
        actor: &Actor,
        spec: NewDelivery,
    ) -> Result<(Order, OrderDelivery), LifecycleError> {
        let mut order = self.store.load_order(order_id).await?;

        if !self.capabilities.may_transition(actor, &order, OrderStatus::Delivered) {
            return Err(LifecycleError::Unauthorized {
                actor: actor.label(),
                action: "submit delivery".to_string(),
            });
        }

        let steps: &[OrderStatus] = match order.status {
            OrderStatus::Confirmed => &[OrderStatus::InProgress, OrderStatus::Delivered],
            OrderStatus::InProgress => &[OrderStatus::Delivered],
            status => return Err(LifecycleError::DeliveryNotAllowed { status }),
        };

        let now = Utc::now();
        let delivery = OrderDelivery {
            delivery_id: Uuid::new_v4(),
            order_id,
            description: spec.description,
            files: spec.files,
            delivered_at: now,
            notes: spec.notes,
        };

        let expected_version = order.version;
        let mut events = Vec::with_capacity(steps.len() + 1);
        let mut from = order.status;
        for &step in steps {
            events.push(self.event(
                &order,
                transition_event_type(step),
                format!("{from} -> {step}"),
                actor,
                json!({ "from": from, "to": step }),
            ));
            from = step;
        }
        events.push(self.event(
            &order,
            event_types::DELIVERY_SUBMITTED,
            format!("delivery submitted with {} file(s)", delivery.files.len()),
            actor,
            json!({ "delivery_id": delivery.delivery_id, "files": delivery.files.len() }),
        ));

        // Delivery row first: a conflict on the order save leaves an unreferenced
        // delivery row, which is harmless; the reverse order could leave a
        // DELIVERED order with no delivery record.
        self.store.insert_delivery(&delivery).await?;

        order.status = OrderStatus::Delivered;
        order.updated_at = now;
        order.version = self.store.save_order(&order, expected_version, &events).await?;

        info!(order_id = %order_id, delivery_id = %delivery.delivery_id, "delivery submitted");
        Ok((order, delivery))
    }

    // -----------------------------------------------------------------
    // Disputes
    // -----------------------------------------------------------------

    /// Open a dispute on a delivered or completed order. At most one dispute
    /// can be open per order.
    pub async fn open_dispute(
        &self,
        order_id: Uuid,
        actor: &Actor,
        reason: &str,
        description: &str,
    ) -> Result<(Order, OrderDispute), LifecycleError> {
        let mut order = self.store.load_order(order_id).await?;
        let from = order.status;

        if !order_transition_allowed(from, OrderStatus::Disputed) {
            return Err(LifecycleError::InvalidTransition {
                from,
                to: OrderStatus::Disputed,
            });
        }
        if !self.capabilities.may_transition(actor, &order, OrderStatus::Disputed) {
            return Err(LifecycleError::Unauthorized {
                actor: actor.label(),
                action: "open dispute".to_string(),
            });
        }
        if let Some(existing) = self.store.find_open_dispute(order_id).await? {
            return Err(LifecycleError::DisputeAlreadyOpen(existing.dispute_id));
        }

        let now = Utc::now();
        let dispute = OrderDispute {
            dispute_id: Uuid::new_v4(),
            order_id,
            reason: reason.to_string(),
            description: description.to_string(),
            status: DisputeStatus::Open,
            created_at: now,
            created_by: actor.label(),
            resolved_at: None,
            resolution: None,
        };

        let expected_version = order.version;
        let event = self.event(
            &order,
            event_types::ORDER_DISPUTED,
            format!("{from} -> {}: {reason}", OrderStatus::Disputed),
            actor,
            json!({ "from": from, "to": OrderStatus::Disputed, "dispute_id": dispute.dispute_id, "reason": reason }),
        );

        self.store.insert_dispute(&dispute).await?;

        order.status = OrderStatus::Disputed;
        order.updated_at = now;
        order.version = self.store.save_order(&order, expected_version, &[event]).await?;

        warn!(order_id = %order_id, dispute_id = %dispute.dispute_id, "dispute opened");
        Ok((order, dispute))
    }

    /// Resolve an open dispute. Requires the Admin capability.
    ///
    /// `ForProvider` completes the order and releases held funds (all, or
    /// `partial_amount` of them); `ForClient` cancels the order and refunds
    /// in full.
    pub async fn resolve_dispute(
        &self,
        order_id: Uuid,
        dispute_id: Uuid,
        actor: &Actor,
        resolution: DisputeResolution,
        notes: Option<&str>,
    ) -> Result<Order, LifecycleError> {
        let mut order = self.store.load_order(order_id).await?;
        let from = order.status;
        let target = match resolution {
            DisputeResolution::ForProvider { .. } => OrderStatus::Completed,
            DisputeResolution::ForClient => OrderStatus::Cancelled,
        };

        if !order_transition_allowed(from, target) {
            return Err(LifecycleError::InvalidTransition { from, to: target });
        }
        if !self.capabilities.may_transition(actor, &order, target) {
            return Err(LifecycleError::Unauthorized {
                actor: actor.label(),
                action: "resolve dispute".to_string(),
            });
        }

        let mut dispute = self
            .store
            .find_open_dispute(order_id)
            .await?
            .filter(|d| d.dispute_id == dispute_id)
            .ok_or(LifecycleError::DisputeNotOpen(dispute_id))?;

        let verdict = match &resolution {
            DisputeResolution::ForProvider { .. } => "for_provider",
            DisputeResolution::ForClient => "for_client",
        };

        let expected_version = order.version;
        let now = Utc::now();
        let mut events = vec![self.event(
            &order,
            event_types::DISPUTE_RESOLVED,
            match notes {
                Some(n) => format!("dispute resolved {verdict}: {n}"),
                None => format!("dispute resolved {verdict}"),
            },
            actor,
            json!({ "dispute_id": dispute_id, "verdict": verdict }),
        )];
        events.push(self.event(
            &order,
            transition_event_type(target),
            format!("{from} -> {target}"),
            actor,
            json!({ "from": from, "to": target }),
        ));

        match resolution {
            DisputeResolution::ForProvider { partial_amount } => {
                // Funds may already be fully released when the dispute was
                // opened post-completion; nothing further to move then. The
                // key is scoped to the dispute so it cannot replay an
                // earlier direct release on this order.
                if order.payment_status == PaymentStatus::Held
                    || order.payment_status == PaymentStatus::PartiallyReleased
                {
                    let key = dispute_release_idempotency_key(order_id, dispute_id);
                    let event = self.do_release(&mut order, partial_amount, actor, key).await?;
                    events.push(event);
                }
            }
            DisputeResolution::ForClient => {
                if let Some(refund_event) = self.refund_on_cancel(&mut order, actor).await? {
                    events.push(refund_event);
                }
            }
        }

        order.status = target;
        order.updated_at = now;
        order.version = self.store.save_order(&order, expected_version, &events).await?;

        // The order row is the source of truth; the dispute record follows.
        dispute.status = DisputeStatus::Resolved;
        dispute.resolved_at = Some(now);
        dispute.resolution = Some(match notes {
            Some(n) => format!("{verdict}: {n}"),
            None => verdict.to_string(),
        });
        self.store.update_dispute(&dispute).await?;

        info!(order_id = %order_id, dispute_id = %dispute_id, verdict, "dispute resolved");
        Ok(order)
    }

    // -----------------------------------------------------------------
    // Reviews
    // -----------------------------------------------------------------

    /// Record post-completion feedback. One review per (reviewer, order);
    /// the recipient is the opposite party. Appends a timeline event but
    /// changes no status.
    pub async fn submit_review(
        &self,
        order_id: Uuid,
        actor: &Actor,
        rating: u8,
        comment: &str,
    ) -> Result<OrderReview, LifecycleError> {
        let order = self.store.load_order(order_id).await?;

        if order.status != OrderStatus::Completed {
            return Err(LifecycleError::ReviewNotAllowed {
                status: order.status,
            });
        }
        if !(1..=5).contains(&rating) {
            return Err(LifecycleError::InvalidRating(rating));
        }

        let recipient_id = if actor.id == order.client_id && actor.role == PartyRole::Client {
            order.provider_id.clone()
        } else if actor.id == order.provider_id && actor.role == PartyRole::Provider {
            order.client_id.clone()
        } else {
            return Err(LifecycleError::Unauthorized {
                actor: actor.label(),
                action: "submit review".to_string(),
            });
        };

        if self.store.find_review(order_id, &actor.id).await?.is_some() {
            return Err(LifecycleError::DuplicateReview {
                order_id,
                reviewer_id: actor.id.clone(),
            });
        }

        let review = OrderReview {
            review_id: Uuid::new_v4(),
            order_id,
            reviewer_id: actor.id.clone(),
            recipient_id,
            rating,
            comment: comment.to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_review(&review).await?;

        let event = self.event(
            &order,
            event_types::REVIEW_SUBMITTED,
            format!("review submitted: {rating}/5"),
            actor,
            json!({ "review_id": review.review_id, "rating": rating }),
        );
        self.store.append_event(&event).await?;

        Ok(review)
    }

    // -----------------------------------------------------------------
    // Read models
    // -----------------------------------------------------------------

    /// The order's full timeline, `created_at` ascending with the store's
    /// insertion sequence as tiebreak. Read-only.
    pub async fn timeline(&self, order_id: Uuid) -> Result<Vec<OrderEvent>, LifecycleError> {
        let mut events = self.store.list_events(order_id).await?;
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq)));
        Ok(events)
    }

    /// Orders where `user_id` acts as `role`, filtered and paginated.
    pub async fn list_orders_by_party(
        &self,
        user_id: &str,
        role: PartyRole,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, LifecycleError> {
        Ok(self.store.list_orders_by_party(user_id, role, filter).await?)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn event(
        &self,
        order: &Order,
        event_type: &str,
        description: String,
        actor: &Actor,
        metadata: Value,
    ) -> NewOrderEvent {
        NewOrderEvent {
            event_id: Uuid::new_v4(),
            order_id: order.order_id,
            event_type: event_type.to_string(),
            description,
            created_at: Utc::now(),
            created_by: actor.label(),
            metadata,
        }
    }

    fn is_order_party(&self, actor: &Actor, order: &Order) -> bool {
        match actor.role {
            PartyRole::Admin => true,
            PartyRole::Client => actor.id == order.client_id,
            PartyRole::Provider => actor.id == order.provider_id,
        }
    }

    // Bound a gateway call by the configured timeout and split its outcome:
    // definitive declines come back as PortOutcome::Declined, ambiguous
    // failures (elapsed timeout, transport) as PaymentPortTimeout, and
    // hard API/decode errors as PaymentFailed without state change.
    async fn port_call<T, Fut>(
        &self,
        operation: PaymentOp,
        fut: Fut,
    ) -> Result<PortOutcome<T>, LifecycleError>
    where
        Fut: Future<Output = Result<T, GatewayError>> + Send,
    {
        match tokio::time::timeout(self.payment_timeout, fut).await {
            Err(_elapsed) => {
                warn!(%operation, "payment port timed out; outcome unknown");
                Err(LifecycleError::PaymentPortTimeout { operation })
            }
            Ok(Ok(value)) => Ok(PortOutcome::Ok(value)),
            Ok(Err(GatewayError::Declined { code, message })) => {
                Ok(PortOutcome::Declined(match code {
                    Some(c) => format!("{c}: {message}"),
                    None => message,
                }))
            }
            Ok(Err(GatewayError::Transport(msg))) => {
                warn!(%operation, error = %msg, "payment port transport failure; outcome unknown");
                Err(LifecycleError::PaymentPortTimeout { operation })
            }
            Ok(Err(err)) => Err(LifecycleError::PaymentFailed {
                message: err.to_string(),
            }),
        }
    }

    // Persist a definitive capture decline: payment -> FAILED plus the
    // payment_failed event, then surface PaymentFailed to the caller.
    async fn record_payment_failure(
        &self,
        mut order: Order,
        expected_version: i64,
        actor: &Actor,
        intent: Option<IntentRef>,
        message: String,
    ) -> Result<Order, LifecycleError> {
        order.payment_status = PaymentStatus::Failed;
        if let Some(intent) = &intent {
            order.payment_intent_ref = Some(intent.as_str().to_string());
        }
        order.updated_at = Utc::now();

        let event = self.event(
            &order,
            event_types::PAYMENT_FAILED,
            format!("payment failed: {message}"),
            actor,
            json!({ "message": message, "intent": intent.as_ref().map(|i| i.as_str().to_string()) }),
        );
        self.store.save_order(&order, expected_version, &[event]).await?;

        warn!(order_id = %order.order_id, %message, "payment capture declined");
        Err(LifecycleError::PaymentFailed { message })
    }

    // Release `amount` (default: everything still held) to the provider,
    // mutating the order's payment fields and returning the timeline event.
    // The caller derives the idempotency key — direct releases are keyed by
    // attempt epoch, dispute-resolution releases by dispute — and persists.
    async fn do_release(
        &self,
        order: &mut Order,
        amount: Option<Cents>,
        actor: &Actor,
        key: IdempotencyKey,
    ) -> Result<NewOrderEvent, LifecycleError> {
        if !matches!(
            order.payment_status,
            PaymentStatus::Held | PaymentStatus::PartiallyReleased
        ) {
            return Err(LifecycleError::InvalidPaymentState {
                payment_status: order.payment_status,
                operation: "release",
            });
        }

        let intent_ref = order
            .payment_intent_ref
            .clone()
            .ok_or(LifecycleError::InvalidPaymentState {
                payment_status: order.payment_status,
                operation: "release without payment intent",
            })?;
        let intent = IntentRef::new(intent_ref);

        let available = order.amount_held.saturating_sub(order.amount_released);
        let amount = amount.unwrap_or(available);
        if !amount.is_positive() || amount > available {
            return Err(LifecycleError::InvalidAmount(format!(
                "release of {amount} exceeds available {available}"
            )));
        }

        let fee = self.fees.platform_fee(amount);
        let payout = amount.checked_sub(fee).filter(|p| !p.is_negative()).ok_or(
            LifecycleError::InvalidAmount(format!("fee {fee} exceeds release amount {amount}")),
        )?;

        let transfer = match self
            .port_call(
                PaymentOp::Release,
                self.gateway.release(&intent, Some(payout), &key),
            )
            .await?
        {
            PortOutcome::Ok(transfer) => transfer,
            PortOutcome::Declined(message) => {
                return Err(LifecycleError::PaymentFailed { message })
            }
        };

        order.amount_released += amount;
        order.payment_status = if order.amount_released == order.amount_held {
            PaymentStatus::Released
        } else {
            PaymentStatus::PartiallyReleased
        };

        info!(
            order_id = %order.order_id,
            %amount, %fee, %payout,
            transfer = transfer.as_str(),
            "funds released to provider"
        );

        Ok(self.event(
            order,
            event_types::PAYMENT_RELEASED,
            format!("released {payout} to provider ({amount} less {fee} platform fee)"),
            actor,
            json!({
                "amount_cents": amount,
                "fee_cents": fee,
                "payout_cents": payout,
                "transfer": transfer.as_str(),
            }),
        ))
    }

    // Refund held (or authorized-but-uncaptured) funds as part of a
    // cancellation. Returns None when there is nothing to refund. Mutates
    // the order's payment fields; caller persists.
    async fn refund_on_cancel(
        &self,
        order: &mut Order,
        actor: &Actor,
    ) -> Result<Option<NewOrderEvent>, LifecycleError> {
        match order.payment_status {
            PaymentStatus::Held => {}
            PaymentStatus::Pending => {
                // Never authorized: nothing to return.
                if order.payment_intent_ref.is_none() {
                    return Ok(None);
                }
            }
            PaymentStatus::Failed | PaymentStatus::Refunded => return Ok(None),
            PaymentStatus::Released | PaymentStatus::PartiallyReleased => {
                return Err(LifecycleError::InvalidPaymentState {
                    payment_status: order.payment_status,
                    operation: "refund after release",
                });
            }
        }

        let intent = IntentRef::new(order.payment_intent_ref.clone().unwrap_or_default());

        // At most one refund per order, so the attempt epoch is fixed at 0;
        // retries after a conflict re-derive the same key.
        let key = payment_idempotency_key(order.order_id, PaymentOp::Refund, 0);
        let refund = match self
            .port_call(
                PaymentOp::Refund,
                self.gateway
                    .refund(&intent, None, Some("order cancelled"), &key),
            )
            .await?
        {
            PortOutcome::Ok(refund) => refund,
            PortOutcome::Declined(message) => {
                return Err(LifecycleError::PaymentFailed { message })
            }
        };

        let refunded = order.amount_held;
        order.payment_status = PaymentStatus::Refunded;

        info!(order_id = %order.order_id, amount = %refunded, refund = refund.as_str(), "escrow refunded");

        Ok(Some(self.event(
            order,
            event_types::PAYMENT_REFUNDED,
            format!("refunded {refunded} to client"),
            actor,
            json!({ "amount_cents": refunded, "refund": refund.as_str() }),
        )))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
