use serde::{Deserialize, Serialize};

use crate::types::{AgentId, Cents, Currency, HoldHash, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Held,
    Released,
    Refunded,
    Disputed,
}

/// Escrowed portion of a verified payment retained during the challenge
/// window. `hold_hash = H(agreementHash ∥ receiptHash ∥ heldAmountCents ∥
/// currency ∥ payerAgentId ∥ payeeAgentId)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallHold {
    pub hold_hash: HoldHash,
    pub agreement_hash: String,
    pub receipt_hash: String,
    pub payer_agent_id: AgentId,
    pub payee_agent_id: AgentId,
    pub held_amount_cents: Cents,
    pub total_amount_cents: Cents,
    pub currency: Currency,
    pub challenge_deadline: Timestamp,
    pub status: HoldStatus,
}
