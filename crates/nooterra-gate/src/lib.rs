//! x402 gate + authority-grant validator.
//!
//! The state machine that authorizes, runs, verifies and settles a single
//! paid tool call against a signed authority envelope (spec §4.3),
//! grounded in the teacher's `StateEngine::apply_action` dispatch — one
//! method per transition, preconditions checked before any mutation, the
//! mutation itself delegated to [`nooterra_ledger::LedgerEngine`] /
//! `Store::commit`.

pub mod grant_validator;
pub mod lifecycle;
pub mod machine;

pub use grant_validator::AuthorityGrantValidator;
pub use lifecycle::check_lifecycle;
pub use machine::{GateApi, VerifyOutcome, X402GateMachine};
