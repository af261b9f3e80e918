//! mkt-schemas
//!
//! Shared domain types for the marketplace order/payment core. This crate
//! owns plain data only: the `Order` aggregate, its child records, the
//! status enums, and the fixed-point money type. No transition logic, no
//! persistence, no gateway wiring — those live in `mkt-lifecycle` and the
//! adapter crates.
//!
//! Prices at rest are decimal major-unit strings; conversion to integer
//! minor units happens exactly once, at the payment boundary, via
//! [`money::Cents::parse_major`].

pub mod money;
pub mod status;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use money::{Cents, MoneyError, CENTS_PER_UNIT};
pub use status::{OrderStatus, PaymentStatus};

// ---------------------------------------------------------------------------
// PriceBreakdown
// ---------------------------------------------------------------------------

/// Price breakdown for an order, stored as decimal major-unit strings.
///
/// Invariant: `total = subtotal + fees + taxes`, checked in minor units by
/// [`PriceBreakdown::validate`]. Construction through [`PriceBreakdown::new`]
/// enforces it; deserialized values must be re-validated before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: String,
    pub fees: String,
    pub taxes: String,
    pub total: String,
    /// ISO 4217 code, e.g. `"USD"`.
    pub currency: String,
}

impl PriceBreakdown {
    /// Build and validate a breakdown in one step.
    pub fn new(
        subtotal: &str,
        fees: &str,
        taxes: &str,
        total: &str,
        currency: &str,
    ) -> Result<Self, MoneyError> {
        let pb = PriceBreakdown {
            subtotal: subtotal.to_string(),
            fees: fees.to_string(),
            taxes: taxes.to_string(),
            total: total.to_string(),
            currency: currency.to_string(),
        };
        pb.validate()?;
        Ok(pb)
    }

    /// Check `total = subtotal + fees + taxes` in minor units.
    ///
    /// A mismatch is reported as [`MoneyError::Malformed`] carrying the
    /// offending total.
    pub fn validate(&self) -> Result<(), MoneyError> {
        let subtotal = Cents::parse_major(&self.subtotal)?;
        let fees = Cents::parse_major(&self.fees)?;
        let taxes = Cents::parse_major(&self.taxes)?;
        let total = Cents::parse_major(&self.total)?;

        let sum = subtotal
            .checked_add(fees)
            .and_then(|v| v.checked_add(taxes))
            .ok_or_else(|| MoneyError::OutOfRange(self.total.clone()))?;

        if sum != total {
            return Err(MoneyError::Malformed(format!(
                "total {} != subtotal+fees+taxes {}",
                total, sum
            )));
        }
        Ok(())
    }

    /// The total in minor units — the amount sent to the payment port.
    pub fn total_cents(&self) -> Result<Cents, MoneyError> {
        Cents::parse_major(&self.total)
    }
}

// ---------------------------------------------------------------------------
// Order (aggregate root)
// ---------------------------------------------------------------------------

/// One purchase of a service between a client and a provider.
///
/// Orders are created on purchase intent, mutated only through the lifecycle
/// engine, and never deleted. `version` is the optimistic-concurrency
/// counter: it starts at 0 and the persistence port increments it on every
/// successful save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub client_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub title: String,
    pub description: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub price: PriceBreakdown,
    /// External payment-authorization reference (gateway intent id).
    pub payment_intent_ref: Option<String>,
    /// Amount currently held in escrow, minor units. Zero until capture.
    pub amount_held: Cents,
    /// Cumulative amount released to the provider, minor units.
    pub amount_released: Cents,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

// ---------------------------------------------------------------------------
// OrderEvent (append-only timeline)
// ---------------------------------------------------------------------------

/// Canonical event-type tags. Free-form strings on the wire; these constants
/// keep producers and tests in agreement.
pub mod event_types {
    pub const ORDER_CREATED: &str = "order_created";
    pub const ORDER_CONFIRMED: &str = "order_confirmed";
    pub const ORDER_STARTED: &str = "order_started";
    pub const ORDER_DELIVERED: &str = "order_delivered";
    pub const ORDER_COMPLETED: &str = "order_completed";
    pub const ORDER_CANCELLED: &str = "order_cancelled";
    pub const ORDER_DISPUTED: &str = "order_disputed";
    pub const DISPUTE_RESOLVED: &str = "dispute_resolved";
    pub const DELIVERY_SUBMITTED: &str = "delivery_submitted";
    pub const REVIEW_SUBMITTED: &str = "review_submitted";
    pub const PAYMENT_CAPTURED: &str = "payment_captured";
    pub const PAYMENT_FAILED: &str = "payment_failed";
    pub const PAYMENT_RELEASED: &str = "payment_released";
    pub const PAYMENT_REFUNDED: &str = "payment_refunded";
}

/// An immutable timeline entry. Never edited or deleted; ordering is
/// `created_at` ascending with `seq` (assigned by the persistence port) as
/// the tiebreak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event_id: Uuid,
    pub order_id: Uuid,
    /// Insertion sequence number assigned by the persistence port.
    pub seq: i64,
    pub event_type: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// Actor identifier ("client:…", "provider:…", "admin:…", "system").
    pub created_by: String,
    pub metadata: Value,
}

/// An event as produced by the engine, before the persistence port assigns
/// its sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderEvent {
    pub event_id: Uuid,
    pub order_id: Uuid,
    pub event_type: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub metadata: Value,
}

// ---------------------------------------------------------------------------
// OrderDelivery
// ---------------------------------------------------------------------------

/// A file attached to a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFile {
    pub name: String,
    pub mime_type: String,
    pub storage_url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A provider's submission of completed work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDelivery {
    pub delivery_id: Uuid,
    pub order_id: Uuid,
    pub description: String,
    pub files: Vec<DeliveryFile>,
    pub delivered_at: DateTime<Utc>,
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// OrderDispute
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "OPEN",
            DisputeStatus::Resolved => "RESOLVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(DisputeStatus::Open),
            "RESOLVED" => Some(DisputeStatus::Resolved),
            _ => None,
        }
    }
}

/// Escalation record for a delivered or completed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDispute {
    pub dispute_id: Uuid,
    pub order_id: Uuid,
    pub reason: String,
    pub description: String,
    pub status: DisputeStatus,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    /// Set only on resolution.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Set only on resolution.
    pub resolution: Option<String>,
}

// ---------------------------------------------------------------------------
// OrderReview
// ---------------------------------------------------------------------------

/// Post-completion feedback; one per (reviewer, order) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReview {
    pub review_id: Uuid,
    pub order_id: Uuid,
    pub reviewer_id: String,
    pub recipient_id: String,
    /// Bounded 1–5; enforced by the lifecycle engine on submission.
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_breakdown_accepts_consistent_totals() {
        let pb = PriceBreakdown::new("100.00", "10.00", "5.00", "115.00", "USD").unwrap();
        assert_eq!(pb.total_cents().unwrap(), Cents::new(11_500));
    }

    #[test]
    fn price_breakdown_rejects_inconsistent_totals() {
        let err = PriceBreakdown::new("100.00", "10.00", "5.00", "120.00", "USD").unwrap_err();
        assert!(matches!(err, MoneyError::Malformed(_)));
    }

    #[test]
    fn price_breakdown_rejects_malformed_component() {
        let err = PriceBreakdown::new("1oo.00", "0", "0", "100.00", "USD").unwrap_err();
        assert!(matches!(err, MoneyError::Malformed(_)));
    }

    #[test]
    fn order_serde_roundtrip() {
        let order = Order {
            order_id: Uuid::new_v4(),
            client_id: "client-1".to_string(),
            provider_id: "provider-1".to_string(),
            service_id: "svc-logo-design".to_string(),
            title: "Logo design".to_string(),
            description: "Three concepts, two revisions".to_string(),
            status: OrderStatus::Created,
            payment_status: PaymentStatus::Pending,
            price: PriceBreakdown::new("100.00", "10.00", "5.00", "115.00", "USD").unwrap(),
            payment_intent_ref: None,
            amount_held: Cents::ZERO,
            amount_released: Cents::ZERO,
            deadline: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 0,
        };
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
    }
}
