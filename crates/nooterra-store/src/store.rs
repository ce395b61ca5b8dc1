use std::sync::Arc;

use nooterra_core::arbitration::{ArbitrationCase, ArbitrationVerdict, SettlementAdjustment};
use nooterra_core::clock::Clock;
use nooterra_core::error::Result;
use nooterra_core::event::Event;
use nooterra_core::gate::X402Gate;
use nooterra_core::grant::AuthorityGrant;
use nooterra_core::hold::ToolCallHold;
use nooterra_core::idempotency::{IdempotencyRecord, IdempotencyScope};
use nooterra_core::model::{Agent, Wallet};
use nooterra_core::types::{AgentId, CaseId, GateId, GrantId, HoldHash, StreamId, TenantId, Timestamp};

use crate::ops::{LedgerOp, SettlementBinding, TxReceipt};

/// Pluggable persistence. In-memory and Postgres implementations must
/// present identical `commit` semantics (§9 "Postgres binding").
pub trait Store: Send + Sync {
    fn clock(&self) -> Arc<dyn Clock>;

    fn get_agent(&self, tenant: &TenantId, agent_id: &AgentId) -> Result<Option<Agent>>;
    fn get_wallet(&self, tenant: &TenantId, agent_id: &AgentId) -> Result<Wallet>;

    fn get_grant(&self, tenant: &TenantId, grant_id: &GrantId) -> Result<Option<AuthorityGrant>>;
    /// All gates referencing `grant_id`, used to compute the running spend total.
    fn gates_for_grant(&self, tenant: &TenantId, grant_id: &GrantId) -> Result<Vec<X402Gate>>;

    fn get_gate(&self, tenant: &TenantId, gate_id: &GateId) -> Result<Option<X402Gate>>;

    fn get_hold(&self, tenant: &TenantId, hold_hash: &HoldHash) -> Result<Option<ToolCallHold>>;
    /// Holds with `challengeDeadline < now`, status `held`, and no open case —
    /// the maintenance loop's candidate set (§4.4).
    fn holds_due_for_auto_release(
        &self,
        tenant: &TenantId,
        now: Timestamp,
    ) -> Result<Vec<ToolCallHold>>;

    fn get_case(&self, tenant: &TenantId, case_id: &CaseId) -> Result<Option<ArbitrationCase>>;
    /// All cases for a tenant, newest-agnostic — the read side of
    /// `GET /tool-calls/arbitration/cases` (§6).
    fn list_cases(&self, tenant: &TenantId) -> Result<Vec<ArbitrationCase>>;
    fn case_for_agreement(
        &self,
        tenant: &TenantId,
        agreement_hash: &str,
    ) -> Result<Option<ArbitrationCase>>;
    fn get_verdict_for_case(
        &self,
        tenant: &TenantId,
        case_id: &CaseId,
    ) -> Result<Option<ArbitrationVerdict>>;

    fn get_adjustment(
        &self,
        tenant: &TenantId,
        adjustment_id: &str,
    ) -> Result<Option<SettlementAdjustment>>;

    fn get_settlement_binding(
        &self,
        tenant: &TenantId,
        agreement_hash: &str,
    ) -> Result<Option<SettlementBinding>>;

    fn stream_events(&self, tenant: &TenantId, stream_id: &StreamId) -> Result<Vec<Event>>;
    fn governance_events(&self, tenant: &TenantId) -> Result<Vec<Event>>;

    fn idempotency_get(
        &self,
        scope: &IdempotencyScope,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>>;
    fn idempotency_put(&self, record: IdempotencyRecord) -> Result<()>;

    /// Atomically apply an ordered op list. Every op's preconditions are
    /// checked before any mutation is made durable; failure of any op
    /// leaves the store untouched.
    fn commit(&self, tenant: &TenantId, ops: Vec<LedgerOp>) -> Result<TxReceipt>;
}
