//! PostgreSQL persistence for the order lifecycle.
//!
//! [`PgStore`] implements `mkt_lifecycle::OrderStore`. The two contracts the
//! engine depends on are enforced here:
//!
//! - **Atomicity** — `save_order` runs the order update and all event
//!   inserts in one transaction.
//! - **Optimistic concurrency** — the update is guarded by
//!   `where order_id = $1 and version = $2`; zero rows affected means
//!   another writer won and the call fails with `VersionConflict`.
//!
//! Timeline rows are append-only; there is no update or delete statement
//! for `order_events` anywhere in this crate.

use anyhow::{Context, Result};
use mkt_lifecycle::{OrderFilter, OrderStore, PartyRole, StoreError};
use mkt_schemas::{
    Cents, DisputeStatus, NewOrderEvent, Order, OrderDelivery, OrderDispute, OrderEvent,
    OrderReview, OrderStatus, PaymentStatus, PriceBreakdown,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub const ENV_DB_URL: &str = "MKT_DATABASE_URL";

/// Connect to Postgres using MKT_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn corrupt(what: &str, value: &str) -> StoreError {
    StoreError::Unavailable(format!("corrupt row: bad {what} {value:?}"))
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let status_s: String = row.try_get("status").map_err(db_err)?;
    let status = OrderStatus::parse(&status_s).ok_or_else(|| corrupt("status", &status_s))?;
    let payment_s: String = row.try_get("payment_status").map_err(db_err)?;
    let payment_status =
        PaymentStatus::parse(&payment_s).ok_or_else(|| corrupt("payment_status", &payment_s))?;

    Ok(Order {
        order_id: row.try_get("order_id").map_err(db_err)?,
        client_id: row.try_get("client_id").map_err(db_err)?,
        provider_id: row.try_get("provider_id").map_err(db_err)?,
        service_id: row.try_get("service_id").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        status,
        payment_status,
        price: PriceBreakdown {
            subtotal: row.try_get("subtotal").map_err(db_err)?,
            fees: row.try_get("fees").map_err(db_err)?,
            taxes: row.try_get("taxes").map_err(db_err)?,
            total: row.try_get("total").map_err(db_err)?,
            currency: row.try_get("currency").map_err(db_err)?,
        },
        payment_intent_ref: row.try_get("payment_intent_ref").map_err(db_err)?,
        amount_held: Cents::new(row.try_get::<i64, _>("amount_held").map_err(db_err)?),
        amount_released: Cents::new(row.try_get::<i64, _>("amount_released").map_err(db_err)?),
        deadline: row.try_get("deadline").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
        version: row.try_get("version").map_err(db_err)?,
    })
}

fn event_from_row(row: &PgRow) -> Result<OrderEvent, StoreError> {
    Ok(OrderEvent {
        event_id: row.try_get("event_id").map_err(db_err)?,
        order_id: row.try_get("order_id").map_err(db_err)?,
        seq: row.try_get("seq").map_err(db_err)?,
        event_type: row.try_get("event_type").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        created_by: row.try_get("created_by").map_err(db_err)?,
        metadata: row.try_get("metadata").map_err(db_err)?,
    })
}

fn dispute_from_row(row: &PgRow) -> Result<OrderDispute, StoreError> {
    let status_s: String = row.try_get("status").map_err(db_err)?;
    let status =
        DisputeStatus::parse(&status_s).ok_or_else(|| corrupt("dispute status", &status_s))?;
    Ok(OrderDispute {
        dispute_id: row.try_get("dispute_id").map_err(db_err)?,
        order_id: row.try_get("order_id").map_err(db_err)?,
        reason: row.try_get("reason").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        status,
        created_at: row.try_get("created_at").map_err(db_err)?,
        created_by: row.try_get("created_by").map_err(db_err)?,
        resolved_at: row.try_get("resolved_at").map_err(db_err)?,
        resolution: row.try_get("resolution").map_err(db_err)?,
    })
}

fn review_from_row(row: &PgRow) -> Result<OrderReview, StoreError> {
    Ok(OrderReview {
        review_id: row.try_get("review_id").map_err(db_err)?,
        order_id: row.try_get("order_id").map_err(db_err)?,
        reviewer_id: row.try_get("reviewer_id").map_err(db_err)?,
        recipient_id: row.try_get("recipient_id").map_err(db_err)?,
        rating: row.try_get::<i16, _>("rating").map_err(db_err)? as u8,
        comment: row.try_get("comment").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

/// PostgreSQL-backed [`OrderStore`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const INSERT_EVENT_SQL: &str = r#"
    insert into order_events (
        event_id, order_id, event_type, description, created_at, created_by, metadata
    ) values ($1, $2, $3, $4, $5, $6, $7)
"#;

fn bind_event<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    event: &'q NewOrderEvent,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(event.event_id)
        .bind(event.order_id)
        .bind(&event.event_type)
        .bind(&event.description)
        .bind(event.created_at)
        .bind(&event.created_by)
        .bind(&event.metadata)
}

#[async_trait::async_trait]
impl OrderStore for PgStore {
    async fn load_order(&self, order_id: Uuid) -> Result<Order, StoreError> {
        let row = sqlx::query("select * from orders where order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::NotFound(order_id))?;
        order_from_row(&row)
    }

    async fn insert_order(&self, order: &Order, event: &NewOrderEvent) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            insert into orders (
                order_id, client_id, provider_id, service_id, title, description,
                status, payment_status,
                subtotal, fees, taxes, total, currency,
                payment_intent_ref, amount_held, amount_released,
                deadline, created_at, updated_at, version
            ) values (
                $1, $2, $3, $4, $5, $6,
                $7, $8,
                $9, $10, $11, $12, $13,
                $14, $15, $16,
                $17, $18, $19, $20
            )
            "#,
        )
        .bind(order.order_id)
        .bind(&order.client_id)
        .bind(&order.provider_id)
        .bind(&order.service_id)
        .bind(&order.title)
        .bind(&order.description)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.price.subtotal)
        .bind(&order.price.fees)
        .bind(&order.price.taxes)
        .bind(&order.price.total)
        .bind(&order.price.currency)
        .bind(&order.payment_intent_ref)
        .bind(order.amount_held.raw())
        .bind(order.amount_released.raw())
        .bind(order.deadline)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.version)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        bind_event(sqlx::query(INSERT_EVENT_SQL), event)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn save_order(
        &self,
        order: &Order,
        expected_version: i64,
        events: &[NewOrderEvent],
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let result = sqlx::query(
            r#"
            update orders set
                status = $3,
                payment_status = $4,
                payment_intent_ref = $5,
                amount_held = $6,
                amount_released = $7,
                updated_at = $8,
                version = version + 1
            where order_id = $1 and version = $2
            "#,
        )
        .bind(order.order_id)
        .bind(expected_version)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.payment_intent_ref)
        .bind(order.amount_held.raw())
        .bind(order.amount_released.raw())
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            // Zero rows: stale version, or no such order at all.
            let exists: (bool,) =
                sqlx::query_as("select exists (select 1 from orders where order_id = $1)")
                    .bind(order.order_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_err)?;
            return Err(if exists.0 {
                StoreError::VersionConflict {
                    expected: expected_version,
                }
            } else {
                StoreError::NotFound(order.order_id)
            });
        }

        for event in events {
            bind_event(sqlx::query(INSERT_EVENT_SQL), event)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(expected_version + 1)
    }

    async fn append_event(&self, event: &NewOrderEvent) -> Result<OrderEvent, StoreError> {
        let sql = format!("{INSERT_EVENT_SQL} returning seq");
        let row = bind_event(sqlx::query(&sql), event)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(OrderEvent {
            event_id: event.event_id,
            order_id: event.order_id,
            seq: row.try_get("seq").map_err(db_err)?,
            event_type: event.event_type.clone(),
            description: event.description.clone(),
            created_at: event.created_at,
            created_by: event.created_by.clone(),
            metadata: event.metadata.clone(),
        })
    }

    async fn list_events(&self, order_id: Uuid) -> Result<Vec<OrderEvent>, StoreError> {
        let rows = sqlx::query(
            "select * from order_events where order_id = $1 order by created_at asc, seq asc",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(event_from_row).collect()
    }

    async fn list_orders_by_party(
        &self,
        user_id: &str,
        role: PartyRole,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, StoreError> {
        // Admin listings are unscoped; client/provider listings match their
        // own column only.
        let party_predicate = match role {
            PartyRole::Client => "client_id = $1",
            PartyRole::Provider => "provider_id = $1",
            PartyRole::Admin => "$1::text is not null",
        };
        let sql = format!(
            r#"
            select * from orders
            where {party_predicate}
              and (cardinality($2::text[]) = 0 or status = any($2))
              and ($3::timestamptz is null or created_at >= $3)
              and ($4::timestamptz is null or created_at <= $4)
            order by created_at desc
            limit $5 offset $6
            "#
        );

        let statuses: Vec<String> = filter
            .statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let limit: i64 = filter.limit.map(i64::from).unwrap_or(i64::MAX);

        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(&statuses)
            .bind(filter.created_from)
            .bind(filter.created_to)
            .bind(limit)
            .bind(i64::from(filter.offset))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(order_from_row).collect()
    }

    async fn insert_delivery(&self, delivery: &OrderDelivery) -> Result<(), StoreError> {
        let files = serde_json::to_value(&delivery.files)
            .map_err(|e| StoreError::Unavailable(format!("delivery files encode failed: {e}")))?;
        sqlx::query(
            r#"
            insert into order_deliveries (
                delivery_id, order_id, description, files, delivered_at, notes
            ) values ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(delivery.delivery_id)
        .bind(delivery.order_id)
        .bind(&delivery.description)
        .bind(&files)
        .bind(delivery.delivered_at)
        .bind(&delivery.notes)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_dispute(&self, dispute: &OrderDispute) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            insert into order_disputes (
                dispute_id, order_id, reason, description, status,
                created_at, created_by, resolved_at, resolution
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(dispute.dispute_id)
        .bind(dispute.order_id)
        .bind(&dispute.reason)
        .bind(&dispute.description)
        .bind(dispute.status.as_str())
        .bind(dispute.created_at)
        .bind(&dispute.created_by)
        .bind(dispute.resolved_at)
        .bind(&dispute.resolution)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_dispute(&self, dispute: &OrderDispute) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            update order_disputes set
                status = $2, resolved_at = $3, resolution = $4
            where dispute_id = $1
            "#,
        )
        .bind(dispute.dispute_id)
        .bind(dispute.status.as_str())
        .bind(dispute.resolved_at)
        .bind(&dispute.resolution)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_open_dispute(&self, order_id: Uuid) -> Result<Option<OrderDispute>, StoreError> {
        let row = sqlx::query("select * from order_disputes where order_id = $1 and status = 'OPEN'")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(dispute_from_row).transpose()
    }

    async fn insert_review(&self, review: &OrderReview) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            insert into order_reviews (
                review_id, order_id, reviewer_id, recipient_id, rating, comment, created_at
            ) values ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(review.review_id)
        .bind(review.order_id)
        .bind(&review.reviewer_id)
        .bind(&review.recipient_id)
        .bind(review.rating as i16)
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_review(
        &self,
        order_id: Uuid,
        reviewer_id: &str,
    ) -> Result<Option<OrderReview>, StoreError> {
        let row = sqlx::query(
            "select * from order_reviews where order_id = $1 and reviewer_id = $2",
        )
        .bind(order_id)
        .bind(reviewer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(review_from_row).transpose()
    }
}
