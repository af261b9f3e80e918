//! Test support for the order lifecycle: an in-memory [`OrderStore`] and
//! fixture builders shared by the scenario suites under `tests/`.
//!
//! [`MemStore`] honors the full persistence contract — atomic
//! `save_order`, version checking, and sequence assignment — so scenario
//! tests exercise the exact engine code paths that run against Postgres.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use mkt_lifecycle::{NewOrder, OrderFilter, OrderStore, PartyRole, StoreError};
use mkt_schemas::{
    NewOrderEvent, Order, OrderDelivery, OrderDispute, OrderEvent, OrderReview, DisputeStatus,
    PriceBreakdown,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// MemStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Inner {
    orders: HashMap<Uuid, Order>,
    events: Vec<OrderEvent>,
    deliveries: Vec<OrderDelivery>,
    disputes: Vec<OrderDispute>,
    reviews: Vec<OrderReview>,
    seq: i64,
}

impl Inner {
    fn push_event(&mut self, event: &NewOrderEvent) -> OrderEvent {
        self.seq += 1;
        let stored = OrderEvent {
            event_id: event.event_id,
            order_id: event.order_id,
            seq: self.seq,
            event_type: event.event_type.clone(),
            description: event.description.clone(),
            created_at: event.created_at,
            created_by: event.created_by.clone(),
            metadata: event.metadata.clone(),
        };
        self.events.push(stored.clone());
        stored
    }
}

/// In-memory [`OrderStore`] with real version checking. Cloning shares the
/// underlying state, so a test can hold a handle while the engine owns one.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct read of the stored order; bypasses the engine.
    pub fn order(&self, order_id: Uuid) -> Option<Order> {
        self.inner.lock().unwrap().orders.get(&order_id).cloned()
    }

    pub fn delivery_count(&self, order_id: Uuid) -> usize {
        self.inner
            .lock()
            .unwrap()
            .deliveries
            .iter()
            .filter(|d| d.order_id == order_id)
            .count()
    }

    pub fn dispute(&self, dispute_id: Uuid) -> Option<OrderDispute> {
        self.inner
            .lock()
            .unwrap()
            .disputes
            .iter()
            .find(|d| d.dispute_id == dispute_id)
            .cloned()
    }

    pub fn event_count(&self, order_id: Uuid) -> usize {
        self.inner
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.order_id == order_id)
            .count()
    }
}

#[async_trait::async_trait]
impl OrderStore for MemStore {
    async fn load_order(&self, order_id: Uuid) -> Result<Order, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(StoreError::NotFound(order_id))
    }

    async fn insert_order(&self, order: &Order, event: &NewOrderEvent) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.orders.insert(order.order_id, order.clone());
        inner.push_event(event);
        Ok(())
    }

    async fn save_order(
        &self,
        order: &Order,
        expected_version: i64,
        events: &[NewOrderEvent],
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let stored = inner
            .orders
            .get(&order.order_id)
            .ok_or(StoreError::NotFound(order.order_id))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
            });
        }
        let mut updated = order.clone();
        updated.version = expected_version + 1;
        inner.orders.insert(order.order_id, updated);
        for event in events {
            inner.push_event(event);
        }
        Ok(expected_version + 1)
    }

    async fn append_event(&self, event: &NewOrderEvent) -> Result<OrderEvent, StoreError> {
        Ok(self.inner.lock().unwrap().push_event(event))
    }

    async fn list_events(&self, order_id: Uuid) -> Result<Vec<OrderEvent>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list_orders_by_party(
        &self,
        user_id: &str,
        role: PartyRole,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| match role {
                PartyRole::Client => o.client_id == user_id,
                PartyRole::Provider => o.provider_id == user_id,
                PartyRole::Admin => true,
            })
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let start = filter.offset as usize;
        let out: Vec<Order> = out.into_iter().skip(start).collect();
        Ok(match filter.limit {
            Some(limit) => out.into_iter().take(limit as usize).collect(),
            None => out,
        })
    }

    async fn insert_delivery(&self, delivery: &OrderDelivery) -> Result<(), StoreError> {
        self.inner.lock().unwrap().deliveries.push(delivery.clone());
        Ok(())
    }

    async fn insert_dispute(&self, dispute: &OrderDispute) -> Result<(), StoreError> {
        self.inner.lock().unwrap().disputes.push(dispute.clone());
        Ok(())
    }

    async fn update_dispute(&self, dispute: &OrderDispute) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(d) = inner
            .disputes
            .iter_mut()
            .find(|d| d.dispute_id == dispute.dispute_id)
        {
            *d = dispute.clone();
        }
        Ok(())
    }

    async fn find_open_dispute(&self, order_id: Uuid) -> Result<Option<OrderDispute>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .disputes
            .iter()
            .find(|d| d.order_id == order_id && d.status == DisputeStatus::Open)
            .cloned())
    }

    async fn insert_review(&self, review: &OrderReview) -> Result<(), StoreError> {
        self.inner.lock().unwrap().reviews.push(review.clone());
        Ok(())
    }

    async fn find_review(
        &self,
        order_id: Uuid,
        reviewer_id: &str,
    ) -> Result<Option<OrderReview>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .reviews
            .iter()
            .find(|r| r.order_id == order_id && r.reviewer_id == reviewer_id)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Standard order spec used across the scenario suites: a 100.00 service
/// with 10.00 fees and 5.00 taxes (total 115.00 USD) between `c-1` and `p-1`.
pub fn logo_order() -> NewOrder {
    NewOrder {
        client_id: "c-1".to_string(),
        provider_id: "p-1".to_string(),
        service_id: "svc-logo-design".to_string(),
        title: "Logo design".to_string(),
        description: "Three concepts, two revision rounds".to_string(),
        price: PriceBreakdown::new("100.00", "10.00", "5.00", "115.00", "USD").unwrap(),
        deadline: Some(Utc::now() + chrono::Duration::days(14)),
    }
}

/// An order spec for a second, unrelated pair of parties.
pub fn copywriting_order() -> NewOrder {
    NewOrder {
        client_id: "c-2".to_string(),
        provider_id: "p-2".to_string(),
        service_id: "svc-copywriting".to_string(),
        title: "Landing page copy".to_string(),
        description: "800 words".to_string(),
        price: PriceBreakdown::new("50.00", "5.00", "0", "55.00", "USD").unwrap(),
        deadline: None,
    }
}
