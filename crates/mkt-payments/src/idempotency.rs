//! Idempotency-key derivation for payment-port calls.
//!
//! # Design invariant
//!
//! Every mutating gateway call is tagged with a key derived from
//! `(order_id, operation, attempt_epoch)` — or, for the release coupled to
//! a dispute resolution, from `(order_id, dispute_id)`. The derivations are
//! **canonical**: every call site — first attempt or any retry after a
//! timeout — must go through this module. Because the mapping is
//! deterministic, a retry of the same logical attempt automatically reuses
//! the same key, so an at-least-once gateway call never double-charges or
//! double-releases.
//!
//! `attempt_epoch` distinguishes deliberate re-attempts (a *new* charge after
//! a definitive decline) from retries of an ambiguous outcome: retries keep
//! the epoch, new attempts increment it.

use uuid::Uuid;

// ---------------------------------------------------------------------------
// PaymentOp
// ---------------------------------------------------------------------------

/// The four mutating payment-port operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentOp {
    Authorize,
    Capture,
    Release,
    Refund,
}

impl PaymentOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOp::Authorize => "authorize",
            PaymentOp::Capture => "capture",
            PaymentOp::Release => "release",
            PaymentOp::Refund => "refund",
        }
    }
}

impl std::fmt::Display for PaymentOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// IdempotencyKey
// ---------------------------------------------------------------------------

/// A caller-supplied token ensuring a retried gateway operation has at most
/// one effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the stable idempotency key for one logical payment operation.
///
/// Format: `"{order_id}:{operation}:{attempt_epoch}"`. No hash is applied:
/// the inputs are already stable, unique identifiers, and a readable key is
/// worth more in gateway dashboards than an opaque one.
pub fn payment_idempotency_key(
    order_id: Uuid,
    operation: PaymentOp,
    attempt_epoch: u64,
) -> IdempotencyKey {
    IdempotencyKey(format!("{order_id}:{operation}:{attempt_epoch}"))
}

/// Derive the key for the release coupled to a dispute resolution.
///
/// Dispute releases live in their own namespace, keyed by the dispute
/// rather than an attempt epoch: a resolution release must never share a
/// key with a direct release on the same order (the gateway would replay
/// the earlier transfer and move nothing), and each dispute resolves at
/// most once.
pub fn dispute_release_idempotency_key(order_id: Uuid, dispute_id: Uuid) -> IdempotencyKey {
    IdempotencyKey(format!("{order_id}:dispute_release:{dispute_id}"))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
