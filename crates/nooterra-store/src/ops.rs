use serde::{Deserialize, Serialize};

use nooterra_core::arbitration::{ArbitrationCase, ArbitrationVerdict, SettlementAdjustment};
use nooterra_core::event::EventPayload;
use nooterra_core::gate::X402Gate;
use nooterra_core::grant::AuthorityGrant;
use nooterra_core::hold::ToolCallHold;
use nooterra_core::model::Agent;
use nooterra_core::types::{AgentId, Cents, Currency, StreamId};

/// A record binding a settlement to the request hash that produced it —
/// the "binding-source" a dispute-open envelope's evidence must match
/// (§4.4 steps 5-6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementBinding {
    pub agreement_hash: String,
    pub request_sha256: String,
}

/// One op in a `commitTx` op-list. Each carries its own preconditions,
/// checked by the store when the batch is applied; failure of any op fails
/// the whole transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LedgerOp {
    AgentUpsert(Agent),
    WalletCredit {
        agent_id: AgentId,
        currency: Currency,
        amount_cents: Cents,
    },
    WalletDebit {
        agent_id: AgentId,
        currency: Currency,
        amount_cents: Cents,
    },
    EscrowLock {
        agent_id: AgentId,
        currency: Currency,
        amount_cents: Cents,
    },
    EscrowRelease {
        agent_id: AgentId,
        currency: Currency,
        amount_cents: Cents,
        to_agent_id: AgentId,
    },
    EscrowRefund {
        agent_id: AgentId,
        currency: Currency,
        amount_cents: Cents,
    },
    HoldbackPlace {
        agent_id: AgentId,
        currency: Currency,
        amount_cents: Cents,
    },
    HoldbackRelease {
        agent_id: AgentId,
        currency: Currency,
        amount_cents: Cents,
    },
    HoldbackRefund {
        agent_id: AgentId,
        currency: Currency,
        amount_cents: Cents,
        refund_to_agent_id: AgentId,
    },
    GrantUpsert(AuthorityGrant),
    GateUpsert(X402Gate),
    HoldUpsert(ToolCallHold),
    CaseUpsert(ArbitrationCase),
    VerdictUpsert(ArbitrationVerdict),
    AdjustmentUpsert(SettlementAdjustment),
    SettlementBindingUpsert(SettlementBinding),
    EventAppend {
        stream_id: StreamId,
        kind: String,
        actor: String,
        payload: EventPayload,
    },
}

/// Result of a successful `commitTx`.
#[derive(Debug, Clone, Default)]
pub struct TxReceipt {
    pub event_ids: Vec<String>,
}
