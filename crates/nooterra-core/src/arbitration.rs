use serde::{Deserialize, Serialize};

use crate::types::{AgentId, CaseId, Cents, KeyId, TenantId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    UnderReview,
    Closed,
}

/// Signed by the opener's currently active key. Binds to a specific hold via
/// `agreementHash`/`receiptHash`/`holdHash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeOpenEnvelope {
    pub envelope_id: String,
    pub case_id: CaseId,
    pub tenant_id: TenantId,
    pub agreement_hash: String,
    pub receipt_hash: String,
    pub hold_hash: String,
    pub opened_by_agent_id: AgentId,
    pub opened_at: Timestamp,
    pub reason_code: String,
    pub nonce: String,
    pub evidence_refs: Vec<String>,
    pub signer_key_id: KeyId,
    pub signature: String,
    pub envelope_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrationCase {
    pub case_id: CaseId,
    pub agreement_hash: String,
    pub receipt_hash: String,
    pub hold_hash: String,
    pub opened_by: AgentId,
    pub arbiter_agent_id: AgentId,
    pub status: CaseStatus,
    pub evidence_refs: Vec<String>,
    pub revision: u32,
    pub dispute_open_envelope: DisputeOpenEnvelope,
}

impl ArbitrationCase {
    pub fn case_id_for(agreement_hash: &str) -> String {
        format!("arb_case_tc_{agreement_hash}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictOutcome {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrationVerdict {
    pub verdict_id: String,
    pub case_id: CaseId,
    pub tenant_id: TenantId,
    pub run_id: String,
    pub settlement_id: String,
    pub dispute_id: String,
    pub arbiter_agent_id: AgentId,
    pub outcome: VerdictOutcome,
    pub release_rate_pct: u32,
    pub rationale: String,
    pub evidence_refs: Vec<String>,
    pub issued_at: Timestamp,
    pub signer_key_id: KeyId,
    pub signature: String,
    pub verdict_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementAdjustmentKind {
    HoldbackRelease,
    HoldbackRefund,
}

/// Deterministic: one adjustment per hold. Retrying the same hold resolution
/// (auto-release or verdict-driven) must produce the identical `adjustmentId`
/// so at-least-once background work can never double-pay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementAdjustment {
    pub adjustment_id: String,
    pub kind: SettlementAdjustmentKind,
    pub amount_cents: Cents,
    pub applied_at: Timestamp,
}

impl SettlementAdjustment {
    pub fn adjustment_id_for(agreement_hash: &str) -> String {
        format!("sadj_agmt_{agreement_hash}_holdback")
    }
}
