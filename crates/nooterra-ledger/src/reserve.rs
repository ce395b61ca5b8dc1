//! Pluggable fiat-rail stub (spec §1 Non-goals: "the core does not itself
//! perform fiat rail transfers — it models a reserve adapter as a pluggable
//! stub").

use nooterra_core::types::Currency;

/// A deployment's real fiat-rail integration would implement this trait.
/// The core never calls it for anything but an indicative quote; no op in
/// `LedgerOp` depends on its output.
pub trait ReserveAdapter: Send + Sync {
    /// Indicative reserve quote for `currency`, in minor units per unit of
    /// account. A real adapter would hit a banking/custody API; this trait
    /// only pins the seam.
    fn quote(&self, currency: Currency) -> u64;
}

/// Default adapter used by tests and the in-memory store: every currency
/// quotes at par.
#[derive(Debug, Default)]
pub struct NullReserveAdapter;

impl ReserveAdapter for NullReserveAdapter {
    fn quote(&self, _currency: Currency) -> u64 {
        1
    }
}
