//! Payment-gateway port.
//!
//! This module defines **only** the gateway trait and its request/response
//! types. No concrete gateway implementations, no persistence, and no
//! lifecycle logic belong here. The deterministic in-memory gateway lives in
//! `mkt-gateway-sandbox`; the live HTTP adapter lives in `mkt-gateway-rest`.
//!
//! Amounts cross this boundary as [`Cents`] (minor-unit integers) — never as
//! floats or decimal strings.

use mkt_schemas::Cents;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::idempotency::IdempotencyKey;

// ---------------------------------------------------------------------------
// Reference newtypes
// ---------------------------------------------------------------------------

/// Gateway-assigned reference to a payment intent (authorization).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentRef(String);

/// Gateway-assigned reference to a transfer (release to provider payout).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferRef(String);

/// Gateway-assigned reference to a refund.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefundRef(String);

macro_rules! ref_impls {
    ($t:ident) => {
        impl $t {
            pub fn new(id: impl Into<String>) -> Self {
                $t(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

ref_impls!(IntentRef);
ref_impls!(TransferRef);
ref_impls!(RefundRef);

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

/// Parameters for creating a payment authorization.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    /// Amount in minor units.
    pub amount: Cents,
    /// ISO 4217 code, e.g. `"USD"`.
    pub currency: String,
    /// Open metadata forwarded to the processor (order id, parties).
    pub metadata: Value,
}

/// Outcome of a successful capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeStatus {
    /// Amount actually captured, minor units.
    pub amount: Cents,
    pub currency: String,
}

// ---------------------------------------------------------------------------
// GatewayError
// ---------------------------------------------------------------------------

/// Errors a [`PaymentGateway`] implementation may return.
///
/// Callers must distinguish [`GatewayError::Declined`] (a definitive
/// processor decision — never retried) from [`GatewayError::Transport`]
/// (ambiguous outcome — safe to retry with the same idempotency key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The processor refused the operation (card declined, insufficient
    /// funds, refund window closed, ...).
    Declined { code: Option<String>, message: String },
    /// Network or transport failure; the operation may or may not have
    /// reached the processor.
    Transport(String),
    /// The processor returned an application-level error (bad request,
    /// unknown reference, misconfigured account).
    Api { status: Option<u16>, message: String },
    /// A response payload could not be decoded.
    Decode(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Declined {
                code: Some(c),
                message,
            } => write!(f, "payment declined ({c}): {message}"),
            GatewayError::Declined { code: None, message } => {
                write!(f, "payment declined: {message}")
            }
            GatewayError::Transport(msg) => write!(f, "gateway transport error: {msg}"),
            GatewayError::Api {
                status: Some(s),
                message,
            } => write!(f, "gateway api error http={s}: {message}"),
            GatewayError::Api {
                status: None,
                message,
            } => write!(f, "gateway api error: {message}"),
            GatewayError::Decode(msg) => write!(f, "gateway decode error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

// ---------------------------------------------------------------------------
// PaymentGateway trait
// ---------------------------------------------------------------------------

/// External payment-processor contract (escrow model).
///
/// Implementations must be object-safe (`Box<dyn PaymentGateway>`) and
/// `Send + Sync` so the lifecycle engine can be shared across request
/// handlers.
///
/// Every mutating call carries an [`IdempotencyKey`]; implementations MUST
/// treat a repeated key as a replay of the original call and return the
/// original outcome without a second side effect. Calls are potentially
/// slow, at-least-once network operations — the caller bounds them with a
/// timeout.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Human-readable name identifying this gateway (e.g. `"sandbox"`).
    fn name(&self) -> &'static str;

    /// Create a payment authorization (hold on the client's funds).
    async fn authorize(
        &self,
        req: AuthorizeRequest,
        key: &IdempotencyKey,
    ) -> Result<IntentRef, GatewayError>;

    /// Convert an authorization into a settled charge held in escrow.
    async fn capture(
        &self,
        intent: &IntentRef,
        key: &IdempotencyKey,
    ) -> Result<ChargeStatus, GatewayError>;

    /// Transfer held funds (all or part) to the provider's payout
    /// destination.
    async fn release(
        &self,
        intent: &IntentRef,
        amount: Option<Cents>,
        key: &IdempotencyKey,
    ) -> Result<TransferRef, GatewayError>;

    /// Return held or authorized funds to the client. Full refund when
    /// `amount` is `None`.
    async fn refund(
        &self,
        intent: &IntentRef,
        amount: Option<Cents>,
        reason: Option<&str>,
        key: &IdempotencyKey,
    ) -> Result<RefundRef, GatewayError>;
}

// Shared-ownership passthrough: lets callers keep a handle on the gateway
// (for inspection) while the engine owns an `Arc` of it.
#[async_trait::async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for std::sync::Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn authorize(
        &self,
        req: AuthorizeRequest,
        key: &IdempotencyKey,
    ) -> Result<IntentRef, GatewayError> {
        (**self).authorize(req, key).await
    }

    async fn capture(
        &self,
        intent: &IntentRef,
        key: &IdempotencyKey,
    ) -> Result<ChargeStatus, GatewayError> {
        (**self).capture(intent, key).await
    }

    async fn release(
        &self,
        intent: &IntentRef,
        amount: Option<Cents>,
        key: &IdempotencyKey,
    ) -> Result<TransferRef, GatewayError> {
        (**self).release(intent, amount, key).await
    }

    async fn refund(
        &self,
        intent: &IntentRef,
        amount: Option<Cents>,
        reason: Option<&str>,
        key: &IdempotencyKey,
    ) -> Result<RefundRef, GatewayError> {
        (**self).refund(intent, amount, reason, key).await
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
