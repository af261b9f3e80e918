//! Lifecycle engine error taxonomy.
//!
//! Split by what the caller should do next:
//!
//! | Variant                  | Caller action                                  |
//! |--------------------------|------------------------------------------------|
//! | `InvalidTransition`      | reject; never retry                            |
//! | `InvalidPaymentState`    | reject; never retry                            |
//! | `Unauthorized`           | reject; never retry                            |
//! | `PaymentFailed`          | surface to the user; a NEW attempt needs a new `attempt_epoch` |
//! | `PaymentPortTimeout`     | ambiguous outcome; retry with the SAME idempotency key |
//! | `ConcurrentModification` | re-read and retry the whole operation          |
//! | `PersistenceUnavailable` | fatal for this request                         |
//!
//! No transition partially applies: on any error the order and its event log
//! are at either the pre-transition or fully-applied post-transition state.

use mkt_payments::PaymentOp;
use mkt_schemas::{MoneyError, OrderStatus, PaymentStatus};
use uuid::Uuid;

use crate::store::StoreError;

/// Errors returned by the lifecycle engine's operations.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleError {
    /// The requested order-axis edge is not in the transition table.
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    /// The payment axis forbids this operation (e.g. release after refund).
    InvalidPaymentState {
        payment_status: PaymentStatus,
        operation: &'static str,
    },
    /// The actor lacks the capability for this action.
    Unauthorized { actor: String, action: String },
    /// The payment port gave a definitive refusal.
    PaymentFailed { message: String },
    /// The payment port did not answer within the configured bound; the
    /// outcome is unknown. Safe to retry with the same idempotency key.
    PaymentPortTimeout { operation: PaymentOp },
    /// Another writer changed the order since it was read.
    ConcurrentModification,
    /// No order with this identifier.
    OrderNotFound(Uuid),
    /// The persistence port failed; not retried locally.
    PersistenceUnavailable(String),
    /// A money amount was malformed, inconsistent, or out of range.
    InvalidAmount(String),
    /// The order's price breakdown failed validation.
    InvalidPrice(MoneyError),
    /// A delivery was submitted while the order cannot accept one.
    DeliveryNotAllowed { status: OrderStatus },
    /// The order already has an open dispute.
    DisputeAlreadyOpen(Uuid),
    /// No open dispute with this identifier on this order.
    DisputeNotOpen(Uuid),
    /// Reviews are only accepted on completed orders.
    ReviewNotAllowed { status: OrderStatus },
    /// Rating outside the 1–5 range.
    InvalidRating(u8),
    /// This reviewer already reviewed this order.
    DuplicateReview { order_id: Uuid, reviewer_id: String },
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleError::InvalidTransition { from, to } => {
                write!(f, "invalid order transition: {from} -> {to}")
            }
            LifecycleError::InvalidPaymentState {
                payment_status,
                operation,
            } => write!(
                f,
                "payment operation '{operation}' not allowed in payment state {payment_status}"
            ),
            LifecycleError::Unauthorized { actor, action } => {
                write!(f, "actor {actor} not authorized for {action}")
            }
            LifecycleError::PaymentFailed { message } => write!(f, "payment failed: {message}"),
            LifecycleError::PaymentPortTimeout { operation } => {
                write!(
                    f,
                    "payment port timed out during '{operation}'; outcome unknown, retry with the same key"
                )
            }
            LifecycleError::ConcurrentModification => {
                write!(f, "order modified concurrently; re-read and retry")
            }
            LifecycleError::OrderNotFound(id) => write!(f, "order {id} not found"),
            LifecycleError::PersistenceUnavailable(msg) => {
                write!(f, "persistence unavailable: {msg}")
            }
            LifecycleError::InvalidAmount(msg) => write!(f, "invalid amount: {msg}"),
            LifecycleError::InvalidPrice(err) => write!(f, "invalid price breakdown: {err}"),
            LifecycleError::DeliveryNotAllowed { status } => {
                write!(f, "delivery not allowed while order is {status}")
            }
            LifecycleError::DisputeAlreadyOpen(id) => {
                write!(f, "order already has open dispute {id}")
            }
            LifecycleError::DisputeNotOpen(id) => write!(f, "dispute {id} is not open"),
            LifecycleError::ReviewNotAllowed { status } => {
                write!(f, "review not allowed while order is {status}")
            }
            LifecycleError::InvalidRating(r) => write!(f, "rating {r} outside 1..=5"),
            LifecycleError::DuplicateReview {
                order_id,
                reviewer_id,
            } => write!(f, "reviewer {reviewer_id} already reviewed order {order_id}"),
        }
    }
}

impl std::error::Error for LifecycleError {}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => LifecycleError::OrderNotFound(id),
            StoreError::VersionConflict { .. } => LifecycleError::ConcurrentModification,
            StoreError::Unavailable(msg) => LifecycleError::PersistenceUnavailable(msg),
        }
    }
}
