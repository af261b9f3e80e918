//! Order/payment lifecycle state machine for the marketplace.
//!
//! # Design
//!
//! Orders live on two coupled axes: the order status (CREATED through
//! COMPLETED/CANCELLED/DISPUTED) and the escrow payment status (PENDING
//! through RELEASED/REFUNDED/FAILED). [`engine::LifecycleEngine`] is the one
//! place both axes are mutated; everything around it is a port:
//!
//! - [`store::OrderStore`] — persistence with optimistic concurrency,
//! - [`mkt_payments::PaymentGateway`] — the external payment processor,
//! - [`capability::CapabilityCheck`] — who may drive which transition,
//! - [`policy::FeePolicy`] — the platform's cut of released funds.
//!
//! # Invariants
//!
//! - Only edges in [`transitions::ORDER_EDGES`] are ever taken.
//! - Every state change appends timeline events atomically with the order
//!   row; the timeline is append-only.
//! - Funds release only from COMPLETED (or admin dispute resolution); a
//!   cancellation refunds whatever is held as part of the same commit.
//! - Payment-port calls are idempotency-keyed and timeout-bounded; an
//!   ambiguous outcome never changes persisted state.

pub mod capability;
pub mod engine;
pub mod error;
pub mod policy;
pub mod store;
pub mod transitions;

pub use capability::{Actor, CapabilityCheck, MarketplaceCapabilities, PartyRole};
pub use engine::{
    DisputeResolution, LifecycleEngine, NewDelivery, NewOrder, DEFAULT_PAYMENT_TIMEOUT,
};
pub use error::LifecycleError;
pub use policy::{BasisPointsFee, FeePolicy, NoFee};
pub use store::{OrderFilter, OrderStore, StoreError};
pub use transitions::{order_transition_allowed, transition_event_type, ORDER_EDGES};
