//! Fee policy port.
//!
//! The platform-fee calculation is an injected policy, not a hardcoded
//! constant: the source systems never agreed on one, and marketplaces change
//! it per category or promotion. The engine only requires that
//! `platform_fee(amount) <= amount`.

use mkt_schemas::Cents;

/// Computes the platform's cut of a released amount.
///
/// The provider payout for a release of `amount` is
/// `amount - platform_fee(amount)`.
pub trait FeePolicy: Send + Sync {
    fn platform_fee(&self, amount: Cents) -> Cents;
}

/// Flat percentage fee expressed in basis points (1 bps = 0.01%).
///
/// Integer arithmetic, remainder rounds toward zero in the provider's favor.
#[derive(Debug, Clone, Copy)]
pub struct BasisPointsFee {
    bps: i64,
}

impl BasisPointsFee {
    /// `bps` must be within 0..=10_000 (0%–100%).
    pub fn new(bps: i64) -> Self {
        debug_assert!((0..=10_000).contains(&bps), "bps out of range");
        BasisPointsFee { bps }
    }
}

impl FeePolicy for BasisPointsFee {
    fn platform_fee(&self, amount: Cents) -> Cents {
        // Overflow clamps to the full amount (payout zero) rather than
        // undercharging; it only occurs for amounts near i64::MAX cents.
        amount.checked_bps(self.bps).unwrap_or(amount)
    }
}

/// No fee at all; useful in tests and for fee-exempt orders.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFee;

impl FeePolicy for NoFee {
    fn platform_fee(&self, _amount: Cents) -> Cents {
        Cents::ZERO
    }
}
