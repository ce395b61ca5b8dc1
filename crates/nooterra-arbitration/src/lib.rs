//! Tool-call holdback + arbitration engine (spec §4.4): the challenge-window
//! and signed-verdict state machine that turns a holdback into a
//! deterministic settlement adjustment.
//!
//! Consumes the gate FSM's holds, the event chain, and the ledger — the
//! layer SPEC_FULL.md's pipeline places directly above `X402Gate FSM`.

pub mod dispute;
pub mod maintenance;
pub mod settlement;
pub mod verdict;

use std::sync::Arc;

use nooterra_core::arbitration::{ArbitrationCase, ArbitrationVerdict};
use nooterra_core::error::Result;
use nooterra_core::types::{AgentId, CaseId, TenantId, Timestamp};
use nooterra_store::Store;

pub use dispute::{AdminOverride, DisputeEngine};
pub use maintenance::{MaintenanceReport, MaintenanceWorker};
pub use verdict::{AcceptOutcome, VerdictEngine};

/// The façade SPEC_FULL.md §6 names: `tool-calls/arbitration/{open,verdict}`
/// plus the read endpoints, backed by one shared `Store`.
pub struct ArbitrationApi {
    store: Arc<dyn Store>,
    dispute: DisputeEngine,
    verdict: VerdictEngine,
    pub maintenance: MaintenanceWorker,
}

impl ArbitrationApi {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            dispute: DisputeEngine::new(store.clone()),
            verdict: VerdictEngine::new(store.clone()),
            maintenance: MaintenanceWorker::new(store.clone()),
            store,
        }
    }

    pub fn open(
        &self,
        tenant: &TenantId,
        envelope: nooterra_core::arbitration::DisputeOpenEnvelope,
        arbiter_agent_id: AgentId,
        admin_override: Option<AdminOverride>,
    ) -> Result<ArbitrationCase> {
        self.dispute.open(tenant, envelope, arbiter_agent_id, admin_override)
    }

    pub fn accept_verdict(&self, tenant: &TenantId, verdict: ArbitrationVerdict, now: Timestamp) -> Result<AcceptOutcome> {
        self.verdict.accept(tenant, verdict, now)
    }

    pub fn get_case(&self, tenant: &TenantId, case_id: &CaseId) -> Result<Option<ArbitrationCase>> {
        self.store.get_case(tenant, case_id)
    }

    pub fn list_cases(&self, tenant: &TenantId) -> Result<Vec<ArbitrationCase>> {
        self.store.list_cases(tenant)
    }

    pub async fn run_maintenance(&self, tenant: &TenantId, now: Timestamp) -> Result<MaintenanceReport> {
        self.maintenance.run_once(tenant, now).await
    }
}
