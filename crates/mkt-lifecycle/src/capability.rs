//! Capability port.
//!
//! Authorization is an injected predicate, not an engine concern: the engine
//! asks "may this actor drive this order to this status" and the
//! implementation answers from whatever identity model the embedding
//! application uses. The shipped [`MarketplaceCapabilities`] implements the
//! standard two-party-plus-admin policy; deployments with richer role models
//! substitute their own implementation.
//!
//! There is deliberately no process-wide default or mutable global — the
//! checker is a constructor parameter of the engine.

use mkt_schemas::{Order, OrderStatus};

// ---------------------------------------------------------------------------
// Actor / PartyRole
// ---------------------------------------------------------------------------

/// The role an actor plays with respect to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartyRole {
    /// The buyer of the service.
    Client,
    /// The seller performing the work.
    Provider,
    /// Marketplace operator; may force any transition (dispute resolution).
    Admin,
}

impl PartyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyRole::Client => "client",
            PartyRole::Provider => "provider",
            PartyRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for PartyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated principal attempting an operation.
///
/// Authentication itself is external; the engine trusts the embedding layer
/// to have established `id` and `role`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: PartyRole,
}

impl Actor {
    pub fn client(id: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            role: PartyRole::Client,
        }
    }

    pub fn provider(id: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            role: PartyRole::Provider,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            role: PartyRole::Admin,
        }
    }

    /// Stable label for event `created_by` fields, e.g. `"client:u-42"`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.role, self.id)
    }
}

// ---------------------------------------------------------------------------
// CapabilityCheck
// ---------------------------------------------------------------------------

/// Evaluates whether an actor may drive `order` to `target`.
///
/// Implement with the application's identity model in production; use a
/// bool stub in tests.
pub trait CapabilityCheck: Send + Sync {
    fn may_transition(&self, actor: &Actor, order: &Order, target: OrderStatus) -> bool;
}

/// Standard marketplace policy:
///
/// - the order's client may CANCEL, COMPLETE (accept delivery), or DISPUTE;
/// - the order's provider may CONFIRM, start IN_PROGRESS, DELIVER, CANCEL,
///   or DISPUTE;
/// - resolving a dispute (any edge out of DISPUTED) requires Admin;
/// - Admin may force any transition.
///
/// Actors who are not a party to the order are always refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketplaceCapabilities;

impl CapabilityCheck for MarketplaceCapabilities {
    fn may_transition(&self, actor: &Actor, order: &Order, target: OrderStatus) -> bool {
        match actor.role {
            PartyRole::Admin => true,
            // Dispute resolution is admin-only regardless of party.
            _ if order.status == OrderStatus::Disputed => false,
            PartyRole::Client => {
                actor.id == order.client_id
                    && matches!(
                        target,
                        OrderStatus::Cancelled | OrderStatus::Completed | OrderStatus::Disputed
                    )
            }
            PartyRole::Provider => {
                actor.id == order.provider_id
                    && matches!(
                        target,
                        OrderStatus::Confirmed
                            | OrderStatus::InProgress
                            | OrderStatus::Delivered
                            | OrderStatus::Cancelled
                            | OrderStatus::Disputed
                    )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
