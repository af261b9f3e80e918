//! Persistence port.
//!
//! The engine consumes this trait; it never talks to a database directly.
//! Implementations: `mkt_db::PgStore` (PostgreSQL) for production,
//! `mkt_testkit::MemStore` for tests and scenario suites.
//!
//! # Atomicity contract
//!
//! [`OrderStore::save_order`] persists the order mutation AND appends the
//! given events as one unit: both succeed or both roll back. The engine
//! relies on this for its "no partial transition" guarantee and calls it as
//! a single logical operation.
//!
//! # Concurrency contract
//!
//! `save_order` compares `expected_version` against the stored row and fails
//! with [`StoreError::VersionConflict`] when another writer got there first.
//! This gives per-order mutual exclusion without in-process locking: two
//! concurrent transitions on the same order never both succeed from the same
//! pre-transition read.

use chrono::{DateTime, Utc};
use mkt_schemas::{
    NewOrderEvent, Order, OrderDelivery, OrderDispute, OrderEvent, OrderReview, OrderStatus,
};
use uuid::Uuid;

use crate::capability::PartyRole;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors a persistence-port implementation may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No order with this identifier.
    NotFound(Uuid),
    /// The row's version no longer matches `expected_version`.
    VersionConflict { expected: i64 },
    /// The backing store failed or is unreachable.
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "order {id} not found"),
            StoreError::VersionConflict { expected } => {
                write!(f, "version conflict: expected {expected}")
            }
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// OrderFilter
// ---------------------------------------------------------------------------

/// Filters for party-scoped order listings.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Keep orders in any of these statuses; empty = all statuses.
    pub statuses: Vec<OrderStatus>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub created_to: Option<DateTime<Utc>>,
    /// Page size; `None` = unbounded.
    pub limit: Option<u32>,
    /// Rows to skip before the page starts.
    pub offset: u32,
}

impl OrderFilter {
    /// `true` when `order` passes the status and date-range predicates.
    /// Pagination is the store's concern.
    pub fn matches(&self, order: &Order) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&order.status) {
            return false;
        }
        if let Some(from) = self.created_from {
            if order.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.created_to {
            if order.created_at > to {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// OrderStore trait
// ---------------------------------------------------------------------------

/// Persistence contract for the order aggregate and its child records.
///
/// Implementations must be `Send + Sync`; the engine is shared across
/// concurrent request handlers.
#[async_trait::async_trait]
pub trait OrderStore: Send + Sync {
    /// Load an order (including its current `version`).
    async fn load_order(&self, order_id: Uuid) -> Result<Order, StoreError>;

    /// Insert a freshly created order together with its creation event.
    /// Atomic: both persist or neither does.
    async fn insert_order(&self, order: &Order, event: &NewOrderEvent) -> Result<(), StoreError>;

    /// Persist an order mutation and append `events`, atomically, iff the
    /// stored version still equals `expected_version`. Returns the new
    /// version.
    async fn save_order(
        &self,
        order: &Order,
        expected_version: i64,
        events: &[NewOrderEvent],
    ) -> Result<i64, StoreError>;

    /// Append a standalone event (no order mutation, e.g. a review).
    async fn append_event(&self, event: &NewOrderEvent) -> Result<OrderEvent, StoreError>;

    /// All events for an order, `created_at` ascending, `seq` tiebreak.
    async fn list_events(&self, order_id: Uuid) -> Result<Vec<OrderEvent>, StoreError>;

    /// Orders where `user_id` is the given party, filtered and paginated,
    /// newest first.
    async fn list_orders_by_party(
        &self,
        user_id: &str,
        role: PartyRole,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, StoreError>;

    async fn insert_delivery(&self, delivery: &OrderDelivery) -> Result<(), StoreError>;

    async fn insert_dispute(&self, dispute: &OrderDispute) -> Result<(), StoreError>;

    /// Update an existing dispute row (resolution fields).
    async fn update_dispute(&self, dispute: &OrderDispute) -> Result<(), StoreError>;

    /// The order's open dispute, if any. At most one can be open.
    async fn find_open_dispute(&self, order_id: Uuid) -> Result<Option<OrderDispute>, StoreError>;

    async fn insert_review(&self, review: &OrderReview) -> Result<(), StoreError>;

    /// An existing review by `reviewer_id` on this order, if any.
    async fn find_review(
        &self,
        order_id: Uuid,
        reviewer_id: &str,
    ) -> Result<Option<OrderReview>, StoreError>;
}
