//! Ledger & escrow engine.
//!
//! Thin, typed wrappers over [`nooterra_store::Store::commit`] for the money
//! movement kinds named in spec §4.5 (credit, debit, escrow lock/release/
//! refund, holdback place/release/refund), plus the idempotency guard every
//! mutating endpoint needs (§4.5 "Idempotency").
//!
//! This crate never mutates a wallet directly — every balance check and
//! mutation lives in the store's `commit`, which is the single place that
//! can linearize a batch of ops against concurrent writers (§5). What this
//! crate adds is the *vocabulary*: named operations instead of raw
//! `LedgerOp` construction, and the idempotency replay/conflict rule.

pub mod idempotency;
pub mod reserve;
pub mod wallet;

pub use idempotency::IdempotencyGuard;
pub use reserve::{NullReserveAdapter, ReserveAdapter};
pub use wallet::LedgerEngine;
