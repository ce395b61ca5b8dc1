//! The tool-call holdback maintenance loop (spec §4.4 "Maintenance loop").
//!
//! A single-flight task that sweeps holds past their challenge deadline with
//! no open case and auto-releases them. Protected by a process-wide
//! advisory lock so a concurrent sweep (another worker tick, or a manual
//! `POST /ops/maintenance/tool-call-holdback/run`) fails closed instead of
//! double-applying a settlement.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use nooterra_core::error::{NooterraError, Result};
use nooterra_core::event::EventPayload;
use nooterra_core::hold::HoldStatus;
use nooterra_core::types::{Cents, StreamId, TenantId, Timestamp};
use nooterra_store::{LedgerOp, Store};

use crate::settlement;

/// What one `run_once` sweep did.
#[derive(Debug, Default, Clone)]
pub struct MaintenanceReport {
    pub released_hold_hashes: Vec<String>,
    pub auto_released_cents: Cents,
}

pub struct MaintenanceWorker {
    store: Arc<dyn Store>,
    lock: Mutex<()>,
}

impl MaintenanceWorker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Sweeps `tenant`'s holds due for auto-release at `now`. Contenders for
    /// the advisory lock fail with `MAINTENANCE_ALREADY_RUNNING` rather than
    /// queueing — the caller decides whether to retry.
    pub async fn run_once(&self, tenant: &TenantId, now: Timestamp) -> Result<MaintenanceReport> {
        let _guard = self.lock.try_lock().map_err(|_| NooterraError::MaintenanceAlreadyRunning)?;

        let mut report = MaintenanceReport::default();
        let due = self.store.holds_due_for_auto_release(tenant, now)?;
        for hold in due {
            let adjustment_id = nooterra_core::arbitration::SettlementAdjustment::adjustment_id_for(&hold.agreement_hash);
            if self.store.get_adjustment(tenant, &adjustment_id)?.is_some() {
                // Already settled by a prior (possibly verdict-driven) sweep
                // that raced this one; skip, at-least-once safe.
                continue;
            }

            let resolution = settlement::resolve(&hold, 100, now);
            let mut ops = settlement::ledger_ops(&hold, &resolution);
            ops.push(LedgerOp::AdjustmentUpsert(resolution.adjustment.clone()));

            let mut released_hold = hold.clone();
            released_hold.status = HoldStatus::Released;
            ops.push(LedgerOp::HoldUpsert(released_hold));

            ops.push(LedgerOp::EventAppend {
                stream_id: StreamId::new(format!("hold_{}", hold.hold_hash)),
                kind: "HOLD_RESOLVED".into(),
                actor: "system:maintenance".into(),
                payload: EventPayload::HoldReleased {
                    hold_hash: hold.hold_hash.to_string(),
                    adjustment_id: resolution.adjustment.adjustment_id.clone(),
                },
            });

            self.store.commit(tenant, ops)?;
            report.auto_released_cents += resolution.release_cents;
            report.released_hold_hashes.push(hold.hold_hash.to_string());
        }

        info!(%tenant, released = report.released_hold_hashes.len(), cents = report.auto_released_cents, "maintenance sweep complete");
        Ok(report)
    }
}
