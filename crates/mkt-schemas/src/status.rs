//! Order and payment status enums.
//!
//! These are closed tagged unions: every status an order or a payment can
//! occupy is a variant here, and the transition tables in `mkt-lifecycle`
//! match on them exhaustively. String forms are the canonical wire/DB
//! representation (upper snake case, as stored in the `orders` table).

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// All valid states on the order axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Purchase intent recorded; provider has not accepted yet.
    Created,
    /// Provider accepted the order.
    Confirmed,
    /// Provider started work.
    InProgress,
    /// Provider submitted a delivery; awaiting client acceptance.
    Delivered,
    /// Client accepted the delivery. Terminal except for the
    /// post-completion dispute window.
    Completed,
    /// Either party cancelled, or a dispute resolved for the client.
    /// **Terminal.**
    Cancelled,
    /// A dispute is open; resolves back to Completed or Cancelled.
    Disputed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Disputed => "DISPUTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(OrderStatus::Created),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "IN_PROGRESS" => Some(OrderStatus::InProgress),
            "DELIVERED" => Some(OrderStatus::Delivered),
            "COMPLETED" => Some(OrderStatus::Completed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            "DISPUTED" => Some(OrderStatus::Disputed),
            _ => None,
        }
    }

    /// Returns `true` if no further transitions are possible on this axis.
    ///
    /// `Completed` is NOT terminal: the post-completion dispute window keeps
    /// one outgoing edge (`Completed -> Disputed`) alive.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PaymentStatus
// ---------------------------------------------------------------------------

/// All valid states on the payment (escrow) axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// No funds captured yet.
    Pending,
    /// Funds authorized and captured; held in escrow.
    Held,
    /// Part of the held amount transferred to the provider.
    PartiallyReleased,
    /// The full held amount transferred to the provider. **Terminal.**
    Released,
    /// Held or pending funds returned to the client. **Terminal.**
    Refunded,
    /// Capture was declined. **Terminal.**
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Held => "HELD",
            PaymentStatus::PartiallyReleased => "PARTIALLY_RELEASED",
            PaymentStatus::Released => "RELEASED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "HELD" => Some(PaymentStatus::Held),
            "PARTIALLY_RELEASED" => Some(PaymentStatus::PartiallyReleased),
            "RELEASED" => Some(PaymentStatus::Released),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            "FAILED" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    /// Returns `true` if no further payment transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Released | PaymentStatus::Refunded | PaymentStatus::Failed
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
