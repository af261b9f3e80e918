//! Deterministic in-memory "sandbox" payment gateway.
//!
//! Design decisions (kept intentionally simple/deterministic):
//! - Intent references are assigned sequentially: `"sandbox:pi:{n}"`.
//! - Transfer and refund references are derived from the idempotency key:
//!     - release: `"sandbox:tr:{key}"`
//!     - refund:  `"sandbox:re:{key}"`
//! - No randomness. No clock.
//! - Every mutating call records its outcome under the idempotency key; a
//!   repeated key replays the recorded outcome (decline included) without a
//!   second side effect, exactly as the live gateway contract requires.
//! - Declines are opt-in via [`SandboxGateway::decline_amount`]: any charge
//!   for that exact amount is refused at capture, the way processors expose
//!   magic test amounts.
//! - Optional artificial latency (`with_latency`) makes the caller's
//!   timeout handling testable.
//!
//! Escrow accounting is enforced: releases cannot exceed what was captured,
//! and a refund is refused once funds have left towards the provider.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use mkt_payments::{
    AuthorizeRequest, ChargeStatus, GatewayError, IdempotencyKey, IntentRef, PaymentGateway,
    RefundRef, TransferRef,
};
use mkt_schemas::Cents;

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

/// One payment intent's escrow ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentState {
    pub amount: Cents,
    pub currency: String,
    pub captured: bool,
    pub released: Cents,
    pub refunded: bool,
}

// Recorded outcome of a mutating call, replayed on idempotency-key repeat.
#[derive(Debug, Clone)]
enum Replay {
    Intent(IntentRef),
    Charge(ChargeStatus),
    Transfer(TransferRef),
    Refund(RefundRef),
    Declined { code: String, message: String },
}

#[derive(Debug, Default)]
struct Inner {
    next_intent: u64,
    intents: BTreeMap<String, IntentState>,
    replays: BTreeMap<String, Replay>,
    decline_amounts: BTreeSet<i64>,
    transfers: u64,
    refunds: u64,
}

// ---------------------------------------------------------------------------
// SandboxGateway
// ---------------------------------------------------------------------------

/// In-memory [`PaymentGateway`] for tests, scenario suites, and local runs.
#[derive(Debug, Default)]
pub struct SandboxGateway {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering any call. For timeout tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Refuse capture of charges for exactly this amount.
    pub fn decline_amount(&self, amount: Cents) {
        self.inner.lock().unwrap().decline_amounts.insert(amount.raw());
    }

    /// Current escrow ledger for an intent, if it exists.
    pub fn intent_state(&self, intent: &IntentRef) -> Option<IntentState> {
        self.inner.lock().unwrap().intents.get(intent.as_str()).cloned()
    }

    /// Number of distinct transfers executed (idempotent replays excluded).
    pub fn transfer_count(&self) -> u64 {
        self.inner.lock().unwrap().transfers
    }

    /// Number of distinct refunds executed (idempotent replays excluded).
    pub fn refund_count(&self) -> u64 {
        self.inner.lock().unwrap().refunds
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn replayed<T>(replay: &Replay, extract: impl FnOnce(&Replay) -> Option<T>) -> Result<T, GatewayError> {
    match replay {
        Replay::Declined { code, message } => Err(GatewayError::Declined {
            code: Some(code.clone()),
            message: message.clone(),
        }),
        other => extract(other).ok_or_else(|| GatewayError::Api {
            status: None,
            message: "idempotency key reused across different operations".to_string(),
        }),
    }
}

#[async_trait::async_trait]
impl PaymentGateway for SandboxGateway {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    async fn authorize(
        &self,
        req: AuthorizeRequest,
        key: &IdempotencyKey,
    ) -> Result<IntentRef, GatewayError> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().unwrap();

        if let Some(replay) = inner.replays.get(key.as_str()) {
            return replayed(replay, |r| match r {
                Replay::Intent(intent) => Some(intent.clone()),
                _ => None,
            });
        }

        if !req.amount.is_positive() {
            return Err(GatewayError::Api {
                status: Some(400),
                message: format!("authorization amount must be positive, got {}", req.amount),
            });
        }

        inner.next_intent += 1;
        let intent = IntentRef::new(format!("sandbox:pi:{}", inner.next_intent));
        inner.intents.insert(
            intent.as_str().to_string(),
            IntentState {
                amount: req.amount,
                currency: req.currency,
                captured: false,
                released: Cents::ZERO,
                refunded: false,
            },
        );
        inner
            .replays
            .insert(key.as_str().to_string(), Replay::Intent(intent.clone()));
        Ok(intent)
    }

    async fn capture(
        &self,
        intent: &IntentRef,
        key: &IdempotencyKey,
    ) -> Result<ChargeStatus, GatewayError> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().unwrap();

        if let Some(replay) = inner.replays.get(key.as_str()) {
            return replayed(replay, |r| match r {
                Replay::Charge(charge) => Some(charge.clone()),
                _ => None,
            });
        }

        let declined = {
            let state = inner.intents.get(intent.as_str()).ok_or_else(|| GatewayError::Api {
                status: Some(404),
                message: format!("no such payment intent: {intent}"),
            })?;
            inner.decline_amounts.contains(&state.amount.raw())
        };
        if declined {
            let decline = Replay::Declined {
                code: "card_declined".to_string(),
                message: "the card was declined".to_string(),
            };
            inner.replays.insert(key.as_str().to_string(), decline);
            return Err(GatewayError::Declined {
                code: Some("card_declined".to_string()),
                message: "the card was declined".to_string(),
            });
        }

        let state = inner
            .intents
            .get_mut(intent.as_str())
            .ok_or_else(|| GatewayError::Api {
                status: Some(404),
                message: format!("no such payment intent: {intent}"),
            })?;
        state.captured = true;
        let charge = ChargeStatus {
            amount: state.amount,
            currency: state.currency.clone(),
        };
        inner
            .replays
            .insert(key.as_str().to_string(), Replay::Charge(charge.clone()));
        Ok(charge)
    }

    async fn release(
        &self,
        intent: &IntentRef,
        amount: Option<Cents>,
        key: &IdempotencyKey,
    ) -> Result<TransferRef, GatewayError> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().unwrap();

        if let Some(replay) = inner.replays.get(key.as_str()) {
            return replayed(replay, |r| match r {
                Replay::Transfer(transfer) => Some(transfer.clone()),
                _ => None,
            });
        }

        let state = inner
            .intents
            .get_mut(intent.as_str())
            .ok_or_else(|| GatewayError::Api {
                status: Some(404),
                message: format!("no such payment intent: {intent}"),
            })?;
        if !state.captured || state.refunded {
            return Err(GatewayError::Declined {
                code: Some("no_funds_held".to_string()),
                message: format!("intent {intent} holds no releasable funds"),
            });
        }
        let available = state.amount.saturating_sub(state.released);
        let amount = amount.unwrap_or(available);
        if !amount.is_positive() || amount > available {
            return Err(GatewayError::Declined {
                code: Some("insufficient_escrow".to_string()),
                message: format!("release of {amount} exceeds held balance {available}"),
            });
        }
        state.released += amount;

        let transfer = TransferRef::new(format!("sandbox:tr:{}", key.as_str()));
        inner.transfers += 1;
        inner
            .replays
            .insert(key.as_str().to_string(), Replay::Transfer(transfer.clone()));
        Ok(transfer)
    }

    async fn refund(
        &self,
        intent: &IntentRef,
        amount: Option<Cents>,
        _reason: Option<&str>,
        key: &IdempotencyKey,
    ) -> Result<RefundRef, GatewayError> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().unwrap();

        if let Some(replay) = inner.replays.get(key.as_str()) {
            return replayed(replay, |r| match r {
                Replay::Refund(refund) => Some(refund.clone()),
                _ => None,
            });
        }

        let state = inner
            .intents
            .get_mut(intent.as_str())
            .ok_or_else(|| GatewayError::Api {
                status: Some(404),
                message: format!("no such payment intent: {intent}"),
            })?;
        if state.released.is_positive() {
            return Err(GatewayError::Declined {
                code: Some("already_released".to_string()),
                message: format!("intent {intent} has released funds; refund refused"),
            });
        }
        if state.refunded {
            return Err(GatewayError::Declined {
                code: Some("already_refunded".to_string()),
                message: format!("intent {intent} was already refunded"),
            });
        }
        let amount = amount.unwrap_or(state.amount);
        if !amount.is_positive() || amount > state.amount {
            return Err(GatewayError::Declined {
                code: Some("invalid_refund_amount".to_string()),
                message: format!("refund of {amount} exceeds charge {}", state.amount),
            });
        }
        state.refunded = true;

        let refund = RefundRef::new(format!("sandbox:re:{}", key.as_str()));
        inner.refunds += 1;
        inner
            .replays
            .insert(key.as_str().to_string(), Replay::Refund(refund.clone()));
        Ok(refund)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
