//! Order transition table.
//!
//! # Design
//!
//! The order axis is an explicit state machine. [`order_transition_allowed`]
//! is the single authority on which edges exist; every mutation path in the
//! engine goes through it. Illegal edges are rejected with
//! `LifecycleError::InvalidTransition` — callers MUST treat that as a
//! definitive refusal, never a retry signal.
//!
//! # State diagram
//!
//! ```text
//!  Created ──► Confirmed ──► InProgress ──► Delivered ──► Completed
//!     │            │             │            │  │            │
//!     │            │             │            │  └─► Disputed ◄┘
//!     │            │             │            │         │   │
//!     ▼            ▼             ▼            ▼         │   ▼
//!  Cancelled ◄─────┴─────────────┴────────────┴─────────┘ Completed
//! ```
//!
//! `Cancelled` is terminal. `Completed` keeps one outgoing edge (the
//! post-completion dispute window; the window policy itself is external).
//! A `Disputed` order resolves back to `Completed` or to `Cancelled`
//! (refund path).

use mkt_schemas::{event_types, OrderStatus};

/// Every legal edge on the order axis, as (from, to) pairs.
///
/// Kept as data so tests can assert the table is exactly this set; the
/// runtime check is the exhaustive match in [`order_transition_allowed`].
pub const ORDER_EDGES: &[(OrderStatus, OrderStatus)] = &[
    (OrderStatus::Created, OrderStatus::Confirmed),
    (OrderStatus::Created, OrderStatus::Cancelled),
    (OrderStatus::Confirmed, OrderStatus::InProgress),
    (OrderStatus::Confirmed, OrderStatus::Cancelled),
    (OrderStatus::InProgress, OrderStatus::Delivered),
    (OrderStatus::InProgress, OrderStatus::Cancelled),
    (OrderStatus::Delivered, OrderStatus::Completed),
    (OrderStatus::Delivered, OrderStatus::Disputed),
    (OrderStatus::Delivered, OrderStatus::Cancelled),
    (OrderStatus::Completed, OrderStatus::Disputed),
    (OrderStatus::Disputed, OrderStatus::Completed),
    (OrderStatus::Disputed, OrderStatus::Cancelled),
];

/// Returns `true` when `(from, to)` is a legal order-axis edge.
pub fn order_transition_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Created, Confirmed)
            | (Created, Cancelled)
            | (Confirmed, InProgress)
            | (Confirmed, Cancelled)
            | (InProgress, Delivered)
            | (InProgress, Cancelled)
            | (Delivered, Completed)
            | (Delivered, Disputed)
            | (Delivered, Cancelled)
            | (Completed, Disputed)
            | (Disputed, Completed)
            | (Disputed, Cancelled)
    )
}

/// The timeline event type recorded when an order *enters* `target`.
pub fn transition_event_type(target: OrderStatus) -> &'static str {
    match target {
        OrderStatus::Created => event_types::ORDER_CREATED,
        OrderStatus::Confirmed => event_types::ORDER_CONFIRMED,
        OrderStatus::InProgress => event_types::ORDER_STARTED,
        OrderStatus::Delivered => event_types::ORDER_DELIVERED,
        OrderStatus::Completed => event_types::ORDER_COMPLETED,
        OrderStatus::Cancelled => event_types::ORDER_CANCELLED,
        OrderStatus::Disputed => event_types::ORDER_DISPUTED,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
