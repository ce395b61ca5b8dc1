//! Deterministic settlement-adjustment computation (spec §4.4 "Settlement
//! adjustment"). Pure functions only: callers fold the result into their own
//! `commitTx` op list so the adjustment, the hold flip, and the case/verdict
//! upserts land atomically.

use nooterra_core::arbitration::{SettlementAdjustment, SettlementAdjustmentKind};
use nooterra_core::hold::{HoldStatus, ToolCallHold};
use nooterra_core::types::{Cents, Timestamp};
use nooterra_store::LedgerOp;

/// The outcome of resolving one hold at a given `releaseRatePct`.
///
/// A `SettlementAdjustment` carries a single `kind`/`amountCents` pair, so an
/// intermediate (0 < pct < 100) split is recorded under whichever leg is
/// non-zero preferentially: `HoldbackRelease` once any amount releases, else
/// `HoldbackRefund`. Both ledger legs still post — see [`ledger_ops`].
pub struct Resolution {
    pub adjustment: SettlementAdjustment,
    pub release_cents: Cents,
    pub refund_cents: Cents,
    pub hold_status: HoldStatus,
}

/// `release = floor(heldAmountCents * releaseRatePct / 100)`, remainder to
/// refund — the payer-side-rounds-up rule picked for the `0 < pct < 100`
/// open question (spec §9a).
pub fn resolve(hold: &ToolCallHold, release_rate_pct: u32, applied_at: Timestamp) -> Resolution {
    let release_cents = hold.held_amount_cents * u64::from(release_rate_pct) / 100;
    let refund_cents = hold.held_amount_cents - release_cents;
    let (kind, hold_status) = if release_cents > 0 {
        (SettlementAdjustmentKind::HoldbackRelease, HoldStatus::Released)
    } else {
        (SettlementAdjustmentKind::HoldbackRefund, HoldStatus::Refunded)
    };
    let amount_cents = if release_cents > 0 { release_cents } else { refund_cents };
    Resolution {
        adjustment: SettlementAdjustment {
            adjustment_id: SettlementAdjustment::adjustment_id_for(&hold.agreement_hash),
            kind,
            amount_cents,
            applied_at,
        },
        release_cents,
        refund_cents,
        hold_status,
    }
}

/// The raw ledger legs a [`Resolution`] requires, in commit order.
pub fn ledger_ops(hold: &ToolCallHold, resolution: &Resolution) -> Vec<LedgerOp> {
    let mut ops = Vec::new();
    if resolution.release_cents > 0 {
        ops.push(LedgerOp::HoldbackRelease {
            agent_id: hold.payee_agent_id.clone(),
            currency: hold.currency,
            amount_cents: resolution.release_cents,
        });
    }
    if resolution.refund_cents > 0 {
        ops.push(LedgerOp::HoldbackRefund {
            agent_id: hold.payee_agent_id.clone(),
            currency: hold.currency,
            amount_cents: resolution.refund_cents,
            refund_to_agent_id: hold.payer_agent_id.clone(),
        });
    }
    ops
}
