//! mkt-payments
//!
//! The payment-port boundary: the [`PaymentGateway`] trait with its
//! request/response types, canonical idempotency-key derivation, and webhook
//! signature verification. This crate owns no money movement itself —
//! concrete adapters live in `mkt-gateway-sandbox` (deterministic, in-memory)
//! and `mkt-gateway-rest` (live HTTP).

pub mod gateway;
pub mod idempotency;
pub mod webhook;

pub use gateway::{
    AuthorizeRequest, ChargeStatus, GatewayError, IntentRef, PaymentGateway, RefundRef,
    TransferRef,
};
pub use idempotency::{
    dispute_release_idempotency_key, payment_idempotency_key, IdempotencyKey, PaymentOp,
};
pub use webhook::{validate_webhook_signature, WebhookError, WebhookEvent};
